use clap::Parser;
use std::time::Duration;
use talon_hunter::config::{Cli, Command, HuntArgs, ProfileAction, ProfileAddArgs, ProfileUpdateArgs};
use talon_hunter::core::profiles::{self, ProfileChanges};
use talon_hunter::utils::{logger, validation::Validate};
use talon_hunter::{
    GorzdravClient, HunterError, JsonProfileStore, Profile, ProfileStore, SearchController,
    SearchRequest, SearchState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init_cli_logger(cli.verbose);

    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = cli.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(2);
    }

    let client = GorzdravClient::new(&cli.base_url);
    let store = JsonProfileStore::new(&cli.store);

    match cli.command {
        Command::Profile { action } => run_profile(action, client, store).await,
        Command::Hunt(args) => run_hunt(args, client, store).await,
    }
}

async fn run_profile(
    action: ProfileAction,
    client: GorzdravClient,
    store: JsonProfileStore,
) -> anyhow::Result<()> {
    match action {
        ProfileAction::Add(args) => add_profile(args, client, store).await,
        ProfileAction::Update(args) => update_profile(args, client, store).await,
        ProfileAction::List { lpu } => {
            let profiles = store.list(&lpu).await?;
            if profiles.is_empty() {
                println!("No profiles saved for clinic {} yet.", lpu);
                return Ok(());
            }
            for profile in profiles {
                println!(
                    "{}  {}  born {}",
                    profile.id,
                    profile.display_name(),
                    profile.birth_date
                );
            }
            Ok(())
        }
        ProfileAction::Remove { id } => {
            if store.remove(&id).await? {
                println!("✅ Profile {} removed.", id);
                Ok(())
            } else {
                eprintln!("❌ Profile '{}' not found.", id);
                std::process::exit(1);
            }
        }
    }
}

async fn add_profile(
    args: ProfileAddArgs,
    client: GorzdravClient,
    store: JsonProfileStore,
) -> anyhow::Result<()> {
    let draft = Profile {
        id: String::new(),
        clinic_id: args.lpu,
        last_name: args.last_name,
        first_name: args.first_name,
        middle_name: args.middle_name,
        birth_date: args.birth_date,
        email: args.email,
        phone: args.phone,
    };

    // The portal knows its patients: booking later requires the id its
    // registry assigns, so validate before saving.
    match profiles::register(&client, &store, draft).await {
        Ok(profile) => {
            println!(
                "✅ Profile saved: {} ({})",
                profile.display_name(),
                profile.id
            );
            Ok(())
        }
        Err(e @ HunterError::ValidationError { .. }) => {
            tracing::error!("profile validation failed: {}", e);
            eprintln!("❌ Profile validation failed: {}", e);
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

async fn update_profile(
    args: ProfileUpdateArgs,
    client: GorzdravClient,
    store: JsonProfileStore,
) -> anyhow::Result<()> {
    let changes = ProfileChanges {
        last_name: args.last_name,
        first_name: args.first_name,
        middle_name: args.middle_name,
        birth_date: args.birth_date,
        email: args.email,
        phone: args.phone,
    };

    match profiles::update(&client, &store, &args.id, changes).await {
        Ok(Some(profile)) => {
            println!(
                "✅ Profile updated: {} ({})",
                profile.display_name(),
                profile.id
            );
            Ok(())
        }
        Ok(None) => {
            eprintln!("❌ Profile '{}' not found.", args.id);
            std::process::exit(1);
        }
        Err(e @ HunterError::ValidationError { .. }) => {
            tracing::error!("profile validation failed: {}", e);
            eprintln!("❌ Profile validation failed: {}", e);
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_hunt(
    args: HuntArgs,
    client: GorzdravClient,
    store: JsonProfileStore,
) -> anyhow::Result<()> {
    let request = SearchRequest {
        clinic_id: args.lpu,
        doctor_id: args.doctor,
        profile_id: args.profile,
        threshold: args.after,
    };
    let controller = SearchController::with_poll_interval(
        client,
        store,
        Duration::from_secs(args.interval_secs),
    );
    let mut updates = controller.subscribe();

    if let Err(e) = controller.start(request).await {
        tracing::error!("could not start search: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(2);
    }

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let update = updates.borrow_and_update().clone();
                tracing::info!("{:?}: {}", update.state, update.message);
                match update.state {
                    SearchState::Succeeded => {
                        println!("✅ Appointment booked: {}", update.message);
                        if let Some(slot) = update.selected_slot {
                            println!("🕐 {} at {}, room {}", slot.start, slot.address, slot.room);
                        }
                        return Ok(());
                    }
                    SearchState::Failed => {
                        eprintln!("❌ Booking failed: {}", update.message);
                        std::process::exit(1);
                    }
                    SearchState::Cancelled => {
                        println!("Search cancelled.");
                        std::process::exit(130);
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, cancelling search");
                controller.cancel().await;
            }
        }
    }
}

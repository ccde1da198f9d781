use crate::domain::model::Profile;
use crate::domain::ports::{PatientRegistry, ProfileStore};
use crate::utils::error::{HunterError, Result};
use chrono::NaiveDate;

/// Field edits applied to a saved profile. `None` keeps the stored value.
#[derive(Debug, Default, Clone)]
pub struct ProfileChanges {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ProfileChanges {
    fn apply(self, profile: &mut Profile) {
        if let Some(last_name) = self.last_name {
            profile.last_name = last_name;
        }
        if let Some(first_name) = self.first_name {
            profile.first_name = first_name;
        }
        if let Some(middle_name) = self.middle_name {
            profile.middle_name = middle_name;
        }
        if let Some(birth_date) = self.birth_date {
            profile.birth_date = birth_date;
        }
        if let Some(email) = self.email {
            profile.email = email;
        }
        if let Some(phone) = self.phone {
            profile.phone = phone;
        }
    }
}

/// Validate a new profile against the patient registry and save it. The
/// profile takes the portal-assigned id; when the registry accepts the
/// profile but reports no id, a locally generated one is used instead.
pub async fn register<R, P>(registry: &R, store: &P, mut profile: Profile) -> Result<Profile>
where
    R: PatientRegistry,
    P: ProfileStore,
{
    profile.id = match registry.search_patient(&profile).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            tracing::warn!("portal returned no patient id, using a local one");
            local_profile_id()
        }
        Err(failure) => return Err(HunterError::validation(failure.to_string())),
    };
    store.upsert(profile.clone()).await?;
    Ok(profile)
}

/// Edit a saved profile and revalidate it against the registry. The stored
/// id survives when the registry reports none; a fresh portal id replaces
/// the stored record instead of duplicating it. `Ok(None)` means no profile
/// with that id exists.
pub async fn update<R, P>(
    registry: &R,
    store: &P,
    profile_id: &str,
    changes: ProfileChanges,
) -> Result<Option<Profile>>
where
    R: PatientRegistry,
    P: ProfileStore,
{
    let Some(mut profile) = store.get(profile_id).await? else {
        return Ok(None);
    };
    changes.apply(&mut profile);

    match registry.search_patient(&profile).await {
        Ok(Some(id)) => profile.id = id,
        Ok(None) => {}
        Err(failure) => return Err(HunterError::validation(failure.to_string())),
    }

    if profile.id != profile_id {
        store.remove(profile_id).await?;
    }
    store.upsert(profile.clone()).await?;
    Ok(Some(profile))
}

fn local_profile_id() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

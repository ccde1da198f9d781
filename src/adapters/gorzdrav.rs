use crate::domain::model::{Profile, Slot};
use crate::domain::ports::{BookingFailure, FetchFailure, PatientRegistry, SchedulingApi};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Portal timestamp format: clinic-local, no offset, optional fraction.
const PORTAL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// HTTP client for the Gorzdrav scheduling portal. Holds no state between
/// calls beyond the connection pool.
pub struct GorzdravClient {
    base_url: String,
    client: Client,
}

impl GorzdravClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://gorzdrav.spb.ru";

    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: Client::new(),
        }
    }
}

impl Default for GorzdravClient {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl PatientRegistry for GorzdravClient {
    async fn search_patient(&self, profile: &Profile) -> Result<Option<String>, FetchFailure> {
        let url = format!("{}/_api/api/v2/patient/search", self.base_url);
        tracing::debug!(lpu = %profile.clinic_id, "searching patient registry");

        let birthdate = format!("{}T00:00:00", profile.birth_date.format("%Y-%m-%d"));
        let birthdate_value = profile.birth_date.format("%d.%m.%Y").to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lpuId", profile.clinic_id.as_str()),
                ("lastName", profile.last_name.as_str()),
                ("firstName", profile.first_name.as_str()),
                ("middleName", profile.middle_name.as_str()),
                ("birthdate", birthdate.as_str()),
                ("birthdateValue", birthdate_value.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;

        let envelope: ApiEnvelope<String> = decode(response).await?;
        if !envelope.success {
            return Err(FetchFailure::Service(envelope.failure_message()));
        }
        Ok(envelope.result)
    }
}

#[async_trait]
impl SchedulingApi for GorzdravClient {
    async fn fetch_available_slots(
        &self,
        clinic_id: &str,
        doctor_id: &str,
    ) -> Result<Vec<Slot>, FetchFailure> {
        let url = format!(
            "{}/_api/api/v2/schedule/lpu/{}/doctor/{}/appointments",
            self.base_url, clinic_id, doctor_id
        );
        tracing::debug!("fetching available slots: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;

        let envelope: ApiEnvelope<Vec<SlotDto>> = decode(response).await?;
        if !envelope.success {
            return Err(FetchFailure::Service(envelope.failure_message()));
        }

        envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .map(Slot::try_from)
            .collect()
    }

    async fn book_slot(
        &self,
        clinic_id: &str,
        profile: &Profile,
        slot: &Slot,
    ) -> Result<String, BookingFailure> {
        let url = format!("{}/_api/api/v2/appointment/create", self.base_url);
        let payload = CreateAppointmentDto {
            lpu_id: clinic_id,
            patient_id: &profile.id,
            appointment_id: &slot.id,
            patient_last_name: &profile.last_name,
            patient_first_name: &profile.first_name,
            patient_middle_name: &profile.middle_name,
            patient_birthdate: format!("{}T00:00:00", profile.birth_date.format("%Y-%m-%d")),
            room: &slot.room,
            num: slot.number,
            address: &slot.address,
            visit_start: slot.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
            esia_id: None,
            referral_id: None,
            ipmpi_card_id: None,
        };
        tracing::debug!(slot = %slot.id, "submitting booking request");

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BookingFailure::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BookingFailure::Transport(format!(
                "HTTP status {}",
                response.status()
            )));
        }

        let envelope: ApiEnvelope<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| BookingFailure::Transport(e.to_string()))?;

        if envelope.success {
            Ok(envelope
                .message
                .unwrap_or_else(|| "Appointment booked".to_string()))
        } else {
            Err(BookingFailure::Service(envelope.failure_message()))
        }
    }
}

async fn decode<T: serde::de::DeserializeOwned + Default>(
    response: reqwest::Response,
) -> Result<ApiEnvelope<T>, FetchFailure> {
    if !response.status().is_success() {
        return Err(FetchFailure::Transport(format!(
            "HTTP status {}",
            response.status()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| FetchFailure::Transport(e.to_string()))
}

/// Every portal endpoint wraps its payload in the same envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn failure_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "service reported a failure without a message".to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotDto {
    id: String,
    visit_start: String,
    visit_end: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    room: String,
    #[serde(default)]
    number: i64,
}

impl TryFrom<SlotDto> for Slot {
    type Error = FetchFailure;

    fn try_from(dto: SlotDto) -> Result<Self, Self::Error> {
        let start = parse_portal_time(&dto.visit_start)?;
        let end = parse_portal_time(&dto.visit_end)?;
        Ok(Slot {
            id: dto.id,
            start,
            end,
            address: dto.address,
            room: dto.room,
            number: dto.number,
        })
    }
}

fn parse_portal_time(value: &str) -> Result<NaiveDateTime, FetchFailure> {
    NaiveDateTime::parse_from_str(value, PORTAL_TIME_FORMAT).map_err(|e| {
        FetchFailure::Service(format!("unparseable slot timestamp '{}': {}", value, e))
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAppointmentDto<'a> {
    lpu_id: &'a str,
    patient_id: &'a str,
    appointment_id: &'a str,
    patient_last_name: &'a str,
    patient_first_name: &'a str,
    patient_middle_name: &'a str,
    patient_birthdate: String,
    room: &'a str,
    num: i64,
    address: &'a str,
    visit_start: String,
    esia_id: Option<&'a str>,
    referral_id: Option<&'a str>,
    ipmpi_card_id: Option<&'a str>,
}

use axum::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    config::Config,
    database::Database,
    errors::{AppError, Result},
    models::ReadingFilter,
    models::Page,
    rules::{classify_adherence, Adherence, GlucoseStatus, GlucoseUnit},
};

const RECENT_READINGS: u32 = 10;
const UPCOMING_APPOINTMENTS: i64 = 3;
const ADHERENCE_WINDOW: i64 = 5;

const INSTRUCTIONS: &str = "You are a supportive diabetes health companion. \
Use the patient context below to give short, practical, encouraging answers about \
glucose management, medication routines, diet and activity. You do not diagnose or \
change treatment; when something looks concerning, advise the patient to contact \
their care team.";

/// Chat model the companion forwards to.
#[async_trait]
pub trait CompanionModel: Send + Sync {
    async fn reply(&self, system_context: &str, message: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextReading {
    pub value: f64,
    pub unit: GlucoseUnit,
    pub status: GlucoseStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMedication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub adherence: Adherence,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAppointment {
    pub title: String,
    pub date: DateTime<Utc>,
    pub doctor: String,
}

/// Snapshot of the patient's record handed to the model as system context.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientContext {
    pub diabetes_type: Option<String>,
    pub diagnosis_date: Option<NaiveDate>,
    pub recent_readings: Vec<ContextReading>,
    pub medications: Vec<ContextMedication>,
    pub upcoming_appointments: Vec<ContextAppointment>,
}

impl PatientContext {
    pub async fn gather(database: &Database, user_id: Uuid, now: DateTime<Utc>) -> Result<Self> {
        let user = database
            .users()
            .find_user_by_id(user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let recent_readings = database
            .readings()
            .list_readings(&ReadingFilter::for_user(user_id), Page::new(Some(1), Some(RECENT_READINGS)))
            .await?
            .into_iter()
            .map(|r| ContextReading {
                value: r.value,
                unit: r.unit,
                status: r.status,
                timestamp: r.timestamp,
            })
            .collect();

        let mut medications = Vec::new();
        for prescription in database.medications().active_prescriptions(user_id).await? {
            let logs = database
                .medications()
                .recent_logs(prescription.id, ADHERENCE_WINDOW)
                .await?;
            let taken = logs.iter().filter(|l| l.taken).count();
            medications.push(ContextMedication {
                name: prescription.medication_name,
                dosage: prescription.dosage,
                frequency: prescription.frequency,
                adherence: classify_adherence(taken, logs.len()),
            });
        }

        let upcoming_appointments = database
            .appointments()
            .upcoming_appointments(user_id, now, UPCOMING_APPOINTMENTS)
            .await?
            .into_iter()
            .map(|a| ContextAppointment { title: a.title, date: a.date, doctor: a.doctor_name })
            .collect();

        Ok(Self {
            diabetes_type: user.diabetes_type,
            diagnosis_date: user.diagnosis_date,
            recent_readings,
            medications,
            upcoming_appointments,
        })
    }

    pub fn system_prompt(&self) -> Result<String> {
        let context = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode context: {}", e)))?;
        Ok(format!("{}\n\nPatient context:\n{}", INSTRUCTIONS, context))
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.openai_base_url,
            &config.openai_api_key,
            &config.openai_model,
            config.openai_max_tokens,
            Duration::from_secs(config.upstream_timeout_secs),
        )
    }
}

#[async_trait]
impl CompanionModel for OpenAiClient {
    async fn reply(&self, system_context: &str, message: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system_context },
                ChatMessage { role: "user", content: message },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.7,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Chat completion request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Chat completion returned {}",
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse chat completion: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::Upstream("Chat completion had no content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new(server.uri(), "sk-test", "gpt-4o", 400, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_reply_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o", "max_tokens": 400})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Try a short walk after meals."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server).reply("context", "Any tips?").await.unwrap();
        assert_eq!(reply, "Try a short walk after meals.");
    }

    #[tokio::test]
    async fn test_error_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server).reply("context", "hello").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        assert!(client(&server).reply("context", "hello").await.is_err());
    }

    #[test]
    fn test_system_prompt_embeds_context() {
        let context = PatientContext {
            diabetes_type: Some("type2".to_string()),
            medications: vec![ContextMedication {
                name: "Metformin".to_string(),
                dosage: "500mg".to_string(),
                frequency: "twice daily".to_string(),
                adherence: Adherence::Good,
            }],
            ..PatientContext::default()
        };

        let prompt = context.system_prompt().unwrap();
        assert!(prompt.starts_with(INSTRUCTIONS));
        assert!(prompt.contains("\"diabetesType\": \"type2\""));
        assert!(prompt.contains("\"adherence\": \"good\""));
    }
}

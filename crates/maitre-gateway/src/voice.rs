//! Voice round-trip: transcribe → ask → synthesize, composed around the
//! chat core. The core itself has no speech dependency.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use maitre_core::ChatService;
use maitre_llm::stt::SpeechToText;
use maitre_llm::tts::TextToSpeech;

use crate::handlers::{ErrorBody, ask_error_response};
use crate::server::AppState;

/// Speech collaborators plus the voice/format used for replies.
pub struct VoiceServices {
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub voice: String,
    pub format: String,
}

#[derive(serde::Deserialize)]
pub(crate) struct VoicePayload {
    /// Base64-encoded audio of the spoken question.
    pub audio: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(serde::Serialize)]
struct VoiceReply {
    question: String,
    answer: String,
    /// Base64-encoded audio of the spoken answer.
    audio: String,
    format: String,
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

pub(crate) async fn voice_handler(
    State(state): State<AppState>,
    Json(payload): Json<VoicePayload>,
) -> Response {
    let Some(speech) = state.speech.clone() else {
        return error_body(
            StatusCode::SERVICE_UNAVAILABLE,
            "speech services are not configured",
        );
    };

    let Ok(audio) = STANDARD.decode(&payload.audio) else {
        return error_body(StatusCode::BAD_REQUEST, "audio must be base64-encoded");
    };

    let transcription = match speech
        .stt
        .transcribe(&audio, payload.language.as_deref())
        .await
    {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("transcription failed: {e}");
            return error_body(StatusCode::BAD_GATEWAY, format!("transcription failed: {e}"));
        }
    };

    let question = transcription.text;
    let answer = match state.chat.ask(payload.session_id, question.clone()).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::warn!("voice chat turn failed: {e}");
            return ask_error_response(&e);
        }
    };

    let audio = match speech
        .tts
        .synthesize(&answer, &speech.voice, &speech.format)
        .await
    {
        Ok(bytes) => STANDARD.encode(bytes),
        Err(e) => {
            tracing::warn!("synthesis failed: {e}");
            return error_body(StatusCode::BAD_GATEWAY, format!("synthesis failed: {e}"));
        }
    };

    Json(VoiceReply {
        question,
        answer,
        audio,
        format: speech.format.clone(),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;

    use axum::Router;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use maitre_core::session::{SessionManager, SessionSettings};
    use maitre_llm::LlmError;
    use maitre_llm::mock::MockProvider;
    use maitre_llm::stt::Transcription;
    use maitre_memory::{InMemoryVectorStore, VectorStore};
    use tower::ServiceExt;

    use super::*;

    struct FixedStt {
        text: String,
    }

    impl SpeechToText for FixedStt {
        fn transcribe(
            &self,
            _audio: &[u8],
            _language: Option<&str>,
        ) -> Pin<Box<dyn Future<Output = Result<Transcription, LlmError>> + Send + '_>> {
            let text = self.text.clone();
            Box::pin(async move {
                Ok(Transcription {
                    text,
                    language: Some("en".into()),
                    duration_secs: Some(1.0),
                })
            })
        }
    }

    struct FixedTts;

    impl TextToSpeech for FixedTts {
        fn synthesize(
            &self,
            _text: &str,
            _voice: &str,
            _format: &str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, LlmError>> + Send + '_>> {
            Box::pin(async { Ok(vec![1, 2, 3]) })
        }
    }

    fn voice_router(speech: Option<VoiceServices>) -> Router {
        let provider = Arc::new(MockProvider::default());
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let settings = SessionSettings {
            self_query: false,
            ..SessionSettings::default()
        };
        let mut state = AppState::new(Arc::new(SessionManager::new(provider, store, settings)));
        state.speech = speech.map(Arc::new);
        crate::router::build_router(state, None, 0, 1_048_576)
    }

    fn services() -> VoiceServices {
        VoiceServices {
            stt: Arc::new(FixedStt {
                text: "How do I pour wine?".into(),
            }),
            tts: Arc::new(FixedTts),
            voice: "neutral".into(),
            format: "wav".into(),
        }
    }

    fn voice_request(audio_b64: &str) -> Request<Body> {
        let body = serde_json::json!({ "audio": audio_b64 });
        Request::builder()
            .method("POST")
            .uri("/voice")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn voice_round_trip_returns_text_and_audio() {
        let app = voice_router(Some(services()));
        let audio = STANDARD.encode(b"pcm bytes");
        let resp = app.oneshot(voice_request(&audio)).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["question"], "How do I pour wine?");
        assert_eq!(json["answer"], "mock answer");
        assert_eq!(json["format"], "wav");
        let reply_audio = STANDARD.decode(json["audio"].as_str().unwrap()).unwrap();
        assert_eq!(reply_audio, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn invalid_base64_is_bad_request() {
        let app = voice_router(Some(services()));
        let resp = app.oneshot(voice_request("not base64!!")).await.unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn unconfigured_speech_is_service_unavailable() {
        let app = voice_router(None);
        let audio = STANDARD.encode(b"pcm");
        let resp = app.oneshot(voice_request(&audio)).await.unwrap();
        assert_eq!(resp.status(), 503);
    }

    #[tokio::test]
    async fn empty_transcription_fails_validation() {
        let app = voice_router(Some(VoiceServices {
            stt: Arc::new(FixedStt {
                text: String::new(),
            }),
            tts: Arc::new(FixedTts),
            voice: "neutral".into(),
            format: "wav".into(),
        }));
        let audio = STANDARD.encode(b"silence");
        let resp = app.oneshot(voice_request(&audio)).await.unwrap();
        assert_eq!(resp.status(), 400);
    }
}

use auraassist::llm_interaction::{Generator, GroqClient};
use auraassist::memory::Exchange;
use auraassist::profile::{ApiKey, UserProfile};
use auraassist::prompt::{self, PromptTemplate};
use auraassist::speech::{GoogleTts, Playback, SpeechRenderer, SpeechSynthesizer};
use auraassist::ChatError;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(message: &str, history: &[Exchange]) -> prompt::PromptRequest {
    let template = PromptTemplate::bundled().unwrap();
    let profile = UserProfile {
        name: "Alex".to_string(),
        ..Default::default()
    };
    prompt::build(&template, &profile, history, message).unwrap()
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

fn groq(server: &MockServer) -> GroqClient {
    GroqClient::with_base_url(ApiKey::new("gsk_test").unwrap(), "openai/gpt-oss-120b", server.uri())
        .unwrap()
}

#[test_log::test(tokio::test)]
async fn test_groq_sends_model_temperature_and_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer gsk_test"))
        .and(body_partial_json(json!({
            "model": "openai/gpt-oss-120b",
            "temperature": 0.7,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("  You are not alone.  ")))
        .expect(1)
        .mount(&server)
        .await;

    let history = vec![Exchange {
        user: "hi".to_string(),
        assistant: "hello".to_string(),
    }];
    let reply = groq(&server)
        .generate(&request("I feel anxious", &history))
        .await
        .unwrap();
    assert_eq!(reply, "You are not alone.");

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    let messages = body["messages"].as_array().unwrap();
    let roles: Vec<_> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    assert_eq!(messages[3]["content"], "I feel anxious");
    assert!(messages[0]["content"].as_str().unwrap().contains("\"name\":\"Alex\""));
}

#[tokio::test]
async fn test_groq_rate_limit_is_a_generation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(1)
        .mount(&server)
        .await;

    let err = groq(&server).generate(&request("hi", &[])).await.unwrap_err();
    match err {
        ChatError::Generation(cause) => assert!(cause.contains("rate limited")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_groq_rejected_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = groq(&server).generate(&request("hi", &[])).await.unwrap_err();
    assert!(err.to_string().contains("API key was rejected"));
}

#[tokio::test]
async fn test_groq_empty_choices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = groq(&server).generate(&request("hi", &[])).await.unwrap_err();
    assert!(matches!(err, ChatError::Generation(_)));
}

#[tokio::test]
async fn test_groq_unreachable() {
    // Nothing listens on port 9 on a test machine.
    let client =
        GroqClient::with_base_url(ApiKey::new("k").unwrap(), "m", "http://127.0.0.1:9").unwrap();
    let err = client.generate(&request("hi", &[])).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_tts_fetches_each_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/translate_tts"))
        .and(query_param("tl", "en"))
        .and(query_param("client", "tw-ob"))
        .and(query_param("total", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"MP3".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let tts = GoogleTts::with_base_url(server.uri()).unwrap();
    let text = "take a slow breath ".repeat(8);
    let audio = tts.synthesize(text.trim(), "en").await.unwrap();
    assert_eq!(audio, b"MP3MP3");
}

#[tokio::test]
async fn test_tts_failure_becomes_no_audio() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/translate_tts"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tts = GoogleTts::with_base_url(server.uri()).unwrap();
    assert!(matches!(
        tts.synthesize("hello", "en").await,
        Err(ChatError::Synthesis(_))
    ));

    let renderer = SpeechRenderer::new(Arc::new(tts));
    assert!(matches!(renderer.render("hello").await, Playback::NoAudio));
}

#[tokio::test]
async fn test_renderer_speaks_only_the_reply_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/translate_tts"))
        .and(query_param("q", "Breathe in slowly."))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"MP3".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let renderer = SpeechRenderer::new(Arc::new(GoogleTts::with_base_url(server.uri()).unwrap()));
    let reply = "**Breathe** in slowly. 🌿\n---\nStress Intensity: 4/10\n⭐⭐⭐⭐☆☆☆☆☆☆\n---";
    let playback = renderer.render(reply).await;
    let clip = playback.clip().expect("audio expected");
    assert_eq!(clip.read().await.unwrap(), b"MP3");
}

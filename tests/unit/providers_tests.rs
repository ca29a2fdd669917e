/*!
 * Tests for the Ollama wire format and the mock capabilities
 */

use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;

use bulletwise::errors::ProviderError;
use bulletwise::generation::GenerationConfig;
use bulletwise::language_utils::{LanguagePair, LanguageTag};
use bulletwise::providers::mock::{MockGenerator, MockTranslator, scripted_summary};
use bulletwise::providers::ollama::{Ollama, OllamaGenerator, OllamaTranslator, fragments_from_jsonl};
use bulletwise::providers::{Generator, SamplingParams, Translator};

fn pair() -> LanguagePair {
    LanguagePair::new(
        LanguageTag::parse("heb_Hebr").unwrap(),
        LanguageTag::parse("eng_Latn").unwrap(),
    )
}

fn client() -> Ollama {
    Ollama::new("http://localhost:11434", Duration::from_secs(5)).unwrap()
}

/// Test that JSON lines split across network chunks decode in order
#[test]
fn test_fragmentsFromJsonl_withRaggedChunks_shouldDecodeInOrder() {
    let body = concat!(
        "{\"response\":\"\u{2022} One\",\"done\":false}\n",
        "{\"response\":\".\\n\",\"done\":false}\n",
        "\n",
        "{\"response\":\"END SUMMARY\",\"done\":false}\n",
        "{\"response\":\"\",\"done\":true,\"done_reason\":\"stop\"}\n",
        "{\"response\":\"never\",\"done\":false}\n",
    );
    let bytes = body.as_bytes();
    let chunks: Vec<Result<Bytes, ProviderError>> = bytes
        .chunks(7)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();

    let fragments: Vec<String> = tokio_test::block_on(async {
        fragments_from_jsonl(futures::stream::iter(chunks))
            .map(|item| item.unwrap())
            .collect()
            .await
    });
    assert_eq!(fragments, vec!["\u{2022} One", ".\n", "END SUMMARY"]);
}

/// Test that an error line and a malformed line both end the stream with an error
#[test]
fn test_fragmentsFromJsonl_withErrors_shouldSurfaceThem() {
    let body: Vec<Result<Bytes, ProviderError>> = vec![
        Ok(Bytes::from_static(b"{\"response\":\"a\",\"done\":false}\n")),
        Ok(Bytes::from_static(b"{\"error\":\"model not found\"}\n")),
    ];
    let items: Vec<_> = tokio_test::block_on(fragments_from_jsonl(futures::stream::iter(body)).collect::<Vec<_>>());
    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok("a".to_string()));
    assert!(matches!(&items[1], Err(ProviderError::RequestFailed(msg)) if msg.contains("model not found")));

    let garbled: Vec<Result<Bytes, ProviderError>> = vec![Ok(Bytes::from_static(b"not json\n"))];
    let items: Vec<_> = tokio_test::block_on(fragments_from_jsonl(futures::stream::iter(garbled)).collect::<Vec<_>>());
    assert!(matches!(items.as_slice(), [Err(ProviderError::ParseError(_))]));
}

/// Test that only supplied generation options reach the wire
#[test]
fn test_ollamaGenerator_requestFor_shouldOmitUnsetOptions() {
    let generator = OllamaGenerator::new(client(), "phi3:mini");

    let bare = serde_json::to_value(generator.request_for("prompt", &GenerationConfig::default())).unwrap();
    assert!(bare.get("options").is_none());
    assert_eq!(bare["stream"], true);

    let config = GenerationConfig {
        top_k: Some(40),
        max_tokens: Some(200),
        ..GenerationConfig::default()
    };
    let json = serde_json::to_value(generator.request_for("prompt", &config)).unwrap();
    assert_eq!(json["options"]["top_k"], 40);
    assert_eq!(json["options"]["num_predict"], 200);
    assert!(json["options"].get("temperature").is_none());
    assert!(json.to_string().find("END SUMMARY").is_none());
}

/// Test that translation is greedy unless sampling is requested
#[test]
fn test_ollamaTranslator_requestFor_shouldDefaultToGreedy() {
    let translator = OllamaTranslator::new(client(), "llama3.2:3b");

    let greedy = serde_json::to_value(translator.request_for("שלום", &pair(), None)).unwrap();
    assert_eq!(greedy["options"]["temperature"], 0.0);
    assert_eq!(greedy["stream"], false);
    assert_eq!(greedy["messages"][0]["role"], "system");
    assert!(greedy["messages"][0]["content"].as_str().unwrap().contains("from Hebrew to English"));
    assert_eq!(greedy["messages"][1]["content"], "שלום");

    let sampling = SamplingParams {
        temperature: Some(0.5),
        top_p: None,
    };
    let sampled = serde_json::to_value(translator.request_for("שלום", &pair(), Some(&sampling))).unwrap();
    assert_eq!(sampled["options"]["temperature"], 0.5);
    assert!(sampled["options"].get("top_p").is_none());
}

#[test]
fn test_ollama_new_invalidEndpoint_shouldFail() {
    assert!(Ollama::new("localhost:11434", Duration::from_secs(1)).is_err());
    assert!(Ollama::new("ftp://localhost", Duration::from_secs(1)).is_err());
    let trimmed = Ollama::new("http://localhost:11434/", Duration::from_secs(1)).unwrap();
    assert_eq!(trimmed.base_url(), "http://localhost:11434");
}

#[tokio::test]
async fn test_mockGenerator_withBullets_shouldReassembleScript() {
    let generator = MockGenerator::with_bullets(&["One.", "Two."], 3);
    let stats = generator.stats();
    let stream = generator.generate("p", &GenerationConfig::default()).await.unwrap();
    let text: String = stream.map(|item| item.unwrap()).collect::<Vec<_>>().await.concat();

    assert_eq!(text, scripted_summary(&["One.", "Two."]));
    assert_eq!(stats.calls(), 1);
    assert_eq!(stats.abandoned(), 0);
    assert_eq!(stats.in_flight(), 0);
}

#[tokio::test]
async fn test_mockTranslator_shouldRecordCallsAndFailOnNeedle() {
    let translator = MockTranslator::fail_on("bad").with_entry("שלום", "Hello");
    let stats = translator.stats();

    assert_eq!(translator.translate("שלום", &pair(), None).await.unwrap(), "Hello");
    assert_eq!(
        translator.translate("good", &pair(), None).await.unwrap(),
        "[eng_Latn] good"
    );
    assert!(translator.translate("a bad one", &pair(), None).await.is_err());

    assert_eq!(stats.call_count(), 3);
    assert_eq!(stats.calls()[1].text, "good");
    assert_eq!(stats.calls()[1].pair, pair());
    assert!(stats.last_sampling().is_none());
}

//! Integration tests against the real hub checkpoint
//! Run with: cargo test --features integration

#![cfg(feature = "integration")]

use comment_sentiment::config::Settings;
use comment_sentiment::sentiment::{
    Classifier, DeviceRequest, HubModelProvider, ModelProvider, TextEncoder, TokenBatch,
};

#[test]
fn rubert_tiny_scores_praise_above_complaints() -> anyhow::Result<()> {
    let settings = Settings::default();
    let provider = HubModelProvider::from_settings(&settings);
    let classifier = Classifier::load(&provider, &settings.model_name, DeviceRequest::Cpu)?;
    let encoder = provider.load_encoder(&settings.model_name, settings.max_token_length)?;

    let praise = encoder.encode("Спасибо, отличная статья! Очень полезно.")?;
    let complaint = encoder.encode("Ужасно, полная ерунда и потраченное время.")?;
    let batch = TokenBatch::new(vec![praise.ids, complaint.ids], encoder.pad_id());

    let scores = classifier.score(&batch)?;
    assert_eq!(scores.len(), 2);
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    assert!(scores[0] > scores[1]);
    Ok(())
}

#[test]
fn long_text_is_truncated_by_the_tokenizer() -> anyhow::Result<()> {
    let settings = Settings::default();
    let provider = HubModelProvider::from_settings(&settings);
    let encoder = provider.load_encoder(&settings.model_name, 32)?;

    let encoded = encoder.encode(&"очень хорошо ".repeat(200))?;
    assert!(encoded.truncated);
    assert_eq!(encoded.ids.len(), 32);
    Ok(())
}

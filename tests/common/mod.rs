//! Fakes and fixtures shared by the integration tests.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use repo_chat::app::App;
use repo_chat::config::Config;
use repo_chat::llm::{ChatMessage, ChatModel};
use repo_chat::registry::RepoRegistry;
use repo_chat_core::embedding::Embedder;
use repo_chat_core::store::memory::InMemoryStore;

/// Deterministic bag-of-bytes embedding.
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        8
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![1.0f32; 8];
                for b in t.bytes() {
                    v[(b % 8) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Answers `answer #n` and records every prompt. Fails while `fail` is set.
#[derive(Default)]
pub struct RecordingModel {
    pub fail: AtomicBool,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl RecordingModel {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for RecordingModel {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("provider unavailable");
        }
        let mut calls = self.calls.lock().unwrap();
        calls.push(messages.to_vec());
        Ok(format!("answer #{}", calls.len()))
    }
}

pub struct TestApp {
    pub app: App,
    pub store: Arc<InMemoryStore>,
    pub model: Arc<RecordingModel>,
}

/// App backed by an in-memory store, with registry and work dir under `root`.
pub fn test_app(root: &Path) -> TestApp {
    let mut config = Config::minimal();
    config.registry.path = root.join("data/repos.json");
    config.fetch.work_dir = root.join("work");
    config.fetch.timeout_secs = 5;

    let store = Arc::new(InMemoryStore::new());
    let model = Arc::new(RecordingModel::default());
    let registry = RepoRegistry::load(&config.registry.path).unwrap();
    let app = App::with_parts(
        config,
        store.clone(),
        Arc::new(HashEmbedder),
        model.clone(),
        registry,
    );
    TestApp { app, store, model }
}

/// Zip archive with every entry placed under `wrapper/`.
pub fn zip_with_wrapper(wrapper: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.add_directory(format!("{}/", wrapper), options).unwrap();
    for (name, body) in files {
        writer
            .start_file(format!("{}/{}", wrapper, name), options)
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Repository page markup carrying the branch indicator.
pub fn repo_page(branch: &str) -> String {
    format!(
        r#"<html><body><summary><span class="css-truncate-target" data-menu-button>{}</span></summary></body></html>"#,
        branch
    )
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

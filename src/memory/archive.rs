//! Summarize-and-archive for cleared conversation logs.
//!
//! On every clear, the full transcript is written to a timestamped file
//! under the archive directory and a condensed LLM summary is added to the
//! index document, so past conversations stay searchable after the live
//! log is emptied.
//!
//! Directory layout:
//!   {archive_dir}/{YYYY-MM-DD_HH-MM-SS}.json   raw transcript
//!   {index_file}                               timestamp -> summary map

use super::shared::Summarizer;
use crate::agent::client::ChatClient;
use crate::message::Message;
use crate::Result;
use chrono::Local;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

/// Timestamp format used for archive file names and index keys.
const ARCHIVE_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Instruction sent alongside the transcript to obtain the summary.
const SUMMARY_REQUEST: &str = "Please generate a memory summary of the above \
conversation. Do not use any tools, only condense the history into the key \
facts, decisions, and open threads.";

/// Persists cleared conversation logs as transcript + summary.
pub struct MemoryArchive {
    client: ChatClient,
    /// System prompt framing the summarization request.
    summary_prompt: String,
    archive_dir: PathBuf,
    index_file: PathBuf,
}

impl MemoryArchive {
    pub fn new(
        client: ChatClient,
        summary_prompt: String,
        archive_dir: PathBuf,
        index_file: PathBuf,
    ) -> Self {
        Self {
            client,
            summary_prompt,
            archive_dir,
            index_file,
        }
    }

    async fn archive(&self, messages: Vec<Message>) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        // Summarize first: a failed LLM call aborts the whole archive pass
        // and the caller decides what to do with the live log.
        let mut request = messages.clone();
        request.push(Message::system(self.summary_prompt.clone()));
        request.push(Message::user(SUMMARY_REQUEST));
        let summary = self.client.chat(&request, None).await?.content;

        let stamp = Local::now().format(ARCHIVE_STAMP_FORMAT).to_string();

        fs::create_dir_all(&self.archive_dir).await?;
        let transcript_path = self.archive_dir.join(format!("{stamp}.json"));
        let transcript = serde_json::to_string_pretty(&messages)?;
        fs::write(&transcript_path, transcript).await?;

        let mut index = self.load_index().await;
        index.insert(stamp, summary);
        let content = serde_json::to_string_pretty(&index)?;
        if let Some(parent) = self.index_file.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.index_file, content).await?;

        info!(
            "archived {} messages to {}",
            messages.len(),
            transcript_path.display()
        );
        Ok(())
    }

    /// Load the timestamp -> summary index. Missing or malformed files come
    /// back empty.
    async fn load_index(&self) -> BTreeMap<String, String> {
        match fs::read_to_string(&self.index_file).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(index) => index,
                Err(e) => {
                    warn!("malformed memory index {}: {e}", self.index_file.display());
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        }
    }
}

impl Summarizer for MemoryArchive {
    fn save(&self, messages: Vec<Message>) -> BoxFuture<'_, Result<()>> {
        self.archive(messages).boxed()
    }
}

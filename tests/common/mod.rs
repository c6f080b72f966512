//! In-memory collaborators for driving whole tracking cycles.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use hytrack::cycle::TrackingCycle;
use hytrack::error::{DispatchError, MailboxError, SourceError};
use hytrack::mailbox::{InboundMail, Mailbox, MailboxSynchronizer, MessageId};
use hytrack::notify::{MailSender, Notifier};
use hytrack::shipment::{EventSnapshot, Waybill};
use hytrack::store::ShipmentStore;
use hytrack::tracking::{RawEvent, StatusResolver, StatusSource};

pub const RECIPIENT: &str = "me@example.com";

pub fn wb(s: &str) -> Waybill {
    Waybill::new(s).unwrap()
}

// ── Mailbox ─────────────────────────────────────────────────────────

/// Unread messages live in `inbox` until marked read.
#[derive(Default)]
pub struct FakeMailbox {
    inbox: Mutex<Vec<InboundMail>>,
    read: Mutex<HashSet<String>>,
    pub fail_fetch: AtomicBool,
    pub fail_mark: AtomicBool,
    pub mark_calls: AtomicUsize,
    /// Number of `mark_read_all` batches, i.e. sessions a real server would see.
    pub ack_batches: AtomicUsize,
}

impl FakeMailbox {
    pub fn deliver(&self, uid: &str, subject: &str, body: &str) {
        self.inbox.lock().unwrap().push(InboundMail {
            id: MessageId(uid.to_string()),
            subject: subject.to_string(),
            body: body.to_string(),
        });
    }

    pub fn is_read(&self, uid: &str) -> bool {
        self.read.lock().unwrap().contains(uid)
    }

    pub fn unread_count(&self) -> usize {
        let read = self.read.lock().unwrap();
        self.inbox
            .lock()
            .unwrap()
            .iter()
            .filter(|m| !read.contains(&m.id.0))
            .count()
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn fetch_unseen(&self) -> Result<Vec<InboundMail>, MailboxError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(MailboxError::Connection("imap down".into()));
        }
        let read = self.read.lock().unwrap();
        Ok(self
            .inbox
            .lock()
            .unwrap()
            .iter()
            .filter(|m| !read.contains(&m.id.0))
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: &MessageId) -> Result<(), MailboxError> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(MailboxError::Connection("imap down".into()));
        }
        self.read.lock().unwrap().insert(id.0.clone());
        Ok(())
    }

    async fn mark_read_all(&self, ids: &[MessageId]) -> Vec<Result<(), MailboxError>> {
        self.ack_batches.fetch_add(1, Ordering::SeqCst);
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            results.push(self.mark_read(id).await);
        }
        results
    }
}

// ── Status source ───────────────────────────────────────────────────

pub enum Step {
    Event(EventSnapshot, bool),
    Down,
    Garbled,
}

pub fn scan(details: &str, time: &str) -> EventSnapshot {
    EventSnapshot {
        location: "MUMBAI HUB".into(),
        details: details.into(),
        date: "14 Mar 2025".into(),
        time: time.into(),
    }
}

/// Answers per waybill from a script; the last step repeats once the
/// script runs out. Unscripted waybills are unavailable.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<Waybill, VecDeque<Step>>>,
    last: Mutex<HashMap<Waybill, Step>>,
    calls: Mutex<Vec<Waybill>>,
}

impl ScriptedSource {
    pub fn script(&self, waybill: &Waybill, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(waybill.clone(), steps.into_iter().collect());
    }

    pub fn calls_for(&self, waybill: &Waybill) -> usize {
        self.calls.lock().unwrap().iter().filter(|w| *w == waybill).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn answer(step: &Step) -> Result<RawEvent, SourceError> {
    match step {
        Step::Event(snapshot, terminal) => Ok(RawEvent {
            snapshot: snapshot.clone(),
            is_terminal: *terminal,
        }),
        Step::Down => Err(SourceError::Unavailable("503".into())),
        Step::Garbled => Err(SourceError::Parse("no SCAN div".into())),
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_latest(&self, waybill: &Waybill) -> Result<RawEvent, SourceError> {
        self.calls.lock().unwrap().push(waybill.clone());

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(waybill)
            .and_then(|q| q.pop_front());
        let mut last = self.last.lock().unwrap();
        if let Some(step) = next {
            last.insert(waybill.clone(), step);
        }
        match last.get(waybill) {
            Some(step) => answer(step),
            None => Err(SourceError::Unavailable("unknown waybill".into())),
        }
    }
}

// ── Mail sender ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMail>>,
    pub fail: AtomicBool,
    pub attempts: AtomicUsize,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_for(&self, waybill: &Waybill) -> Vec<SentMail> {
        self.sent()
            .into_iter()
            .filter(|m| m.subject.contains(waybill.as_str()))
            .collect()
    }
}

#[async_trait]
impl MailSender for RecordingSender {
    async fn send(&self, recipient: &str, subject: &str, html_body: &str) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DispatchError::Transport("421 service not available".into()));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: recipient.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        });
        Ok(())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub mailbox: Arc<FakeMailbox>,
    pub source: Arc<ScriptedSource>,
    pub sender: Arc<RecordingSender>,
    pub cycle: TrackingCycle,
}

impl Harness {
    pub fn new() -> Self {
        let mailbox = Arc::new(FakeMailbox::default());
        let source = Arc::new(ScriptedSource::default());
        let sender = Arc::new(RecordingSender::default());
        let cycle = TrackingCycle::new(
            MailboxSynchronizer::new(mailbox.clone()),
            StatusResolver::new(source.clone()),
            Notifier::new(sender.clone(), RECIPIENT),
        );
        Self {
            dir: tempfile::tempdir().unwrap(),
            mailbox,
            source,
            sender,
            cycle,
        }
    }

    pub fn store_path(&self) -> std::path::PathBuf {
        self.dir.path().join("active_ids.json")
    }

    pub async fn load(&self) -> ShipmentStore {
        ShipmentStore::load(self.store_path()).await.unwrap()
    }

    /// Load, run one cycle, return the report. Like one process invocation.
    pub async fn run_cycle(&self) -> hytrack::CycleReport {
        self.cycle.run_at(&self.store_path()).await.unwrap()
    }
}

/// An empty store that can never be saved: once loaded, its parent
/// directory is replaced by a regular file.
pub async fn unwritable_store(dir: &Path) -> ShipmentStore {
    let parent = dir.join("state");
    let store = ShipmentStore::load(parent.join("active_ids.json")).await.unwrap();
    std::fs::write(&parent, "x").unwrap();
    store
}

//! In-memory transmitter and mailboxes for driving whole delivery runs.

#![allow(dead_code, clippy::unwrap_used)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use mailprobe_core::{
    Endpoint, MailboxConnector, MailboxEntry, MailboxSession, Probe, ProbeError, Result,
    Transmitter,
};

/// Builds a minimal RFC 5322 message.
pub fn message(from: &str, subject: &str) -> Vec<u8> {
    format!(
        "From: {from}\r\n\
         Subject: {subject}\r\n\
         Date: Sun, 18 Oct 2026 10:15:00 +0000\r\n\
         Message-ID: <{}@test>\r\n\
         \r\n\
         body\r\n",
        subject.len()
    )
    .into_bytes()
}

/// Records submissions and answers with a fixed result.
#[derive(Clone, Default)]
pub struct FakeTransmitter {
    submitted: Rc<RefCell<Vec<(String, String)>>>,
    refused: Vec<String>,
    failure: Option<ProbeError>,
}

impl FakeTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing(recipients: &[&str]) -> Self {
        Self {
            refused: recipients.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn failing(error: ProbeError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// `(endpoint, subject)` of every submission.
    pub fn submitted(&self) -> Vec<(String, String)> {
        self.submitted.borrow().clone()
    }
}

impl Transmitter for FakeTransmitter {
    async fn transmit(&self, endpoint: &Endpoint, outbound: &Probe) -> Result<Vec<String>> {
        self.submitted
            .borrow_mut()
            .push((endpoint.id.clone(), outbound.subject.clone()));
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.refused.clone()),
        }
    }
}

/// Mailbox command the server answers with `-ERR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    List,
    Retrieve,
    Delete,
    Quit,
}

#[derive(Default)]
struct Mailbox {
    scheduled: Vec<(u32, Vec<u8>)>,
    messages: Vec<Vec<u8>>,
    deleted: Vec<Vec<u8>>,
    connects: u32,
    retrievals: u32,
    quits: u32,
    reject_login: bool,
    faults: Vec<Fault>,
}

impl Mailbox {
    fn check(&self, endpoint: &str, fault: Fault) -> Result<()> {
        if self.faults.contains(&fault) {
            return Err(ProbeError::mailbox(endpoint, format!("-ERR {fault:?} refused")));
        }
        Ok(())
    }
}

/// Mailboxes keyed by endpoint id, with messages that appear on a given
/// connect.
#[derive(Clone, Default)]
pub struct FakeMailboxes {
    boxes: Rc<RefCell<HashMap<String, Mailbox>>>,
}

impl FakeMailboxes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `subject` visible from the `connect`-th connection on.
    pub fn deliver_on(&self, endpoint: &str, connect: u32, subject: &str) {
        let mut boxes = self.boxes.borrow_mut();
        boxes
            .entry(endpoint.to_string())
            .or_default()
            .scheduled
            .push((connect, message("sender@hisp.example", subject)));
    }

    /// Puts a message in the mailbox right away.
    pub fn deliver(&self, endpoint: &str, subject: &str) {
        self.deliver_on(endpoint, 1, subject);
    }

    /// Puts raw bytes in the mailbox right away.
    pub fn deliver_raw(&self, endpoint: &str, raw: &[u8]) {
        let mut boxes = self.boxes.borrow_mut();
        boxes
            .entry(endpoint.to_string())
            .or_default()
            .scheduled
            .push((1, raw.to_vec()));
    }

    pub fn reject_login(&self, endpoint: &str) {
        self.boxes
            .borrow_mut()
            .entry(endpoint.to_string())
            .or_default()
            .reject_login = true;
    }

    /// Makes every `fault` command at `endpoint` fail.
    pub fn fail(&self, endpoint: &str, fault: Fault) {
        self.boxes
            .borrow_mut()
            .entry(endpoint.to_string())
            .or_default()
            .faults
            .push(fault);
    }

    pub fn connects(&self, endpoint: &str) -> u32 {
        self.boxes.borrow().get(endpoint).map_or(0, |m| m.connects)
    }

    pub fn retrievals(&self, endpoint: &str) -> u32 {
        self.boxes.borrow().get(endpoint).map_or(0, |m| m.retrievals)
    }

    /// Successful QUITs.
    pub fn quits(&self, endpoint: &str) -> u32 {
        self.boxes.borrow().get(endpoint).map_or(0, |m| m.quits)
    }

    /// Number of messages still stored (delivered and not deleted).
    pub fn remaining(&self, endpoint: &str) -> usize {
        self.boxes.borrow().get(endpoint).map_or(0, |m| m.messages.len())
    }

    /// Subjects of the messages deleted so far.
    pub fn deleted_subjects(&self, endpoint: &str) -> Vec<String> {
        self.boxes.borrow().get(endpoint).map_or_else(Vec::new, |m| {
            m.deleted
                .iter()
                .filter_map(|raw| {
                    mailprobe_mime::Message::parse(raw)
                        .ok()
                        .and_then(|msg| msg.subject())
                })
                .collect()
        })
    }
}

pub struct FakeSession {
    boxes: Rc<RefCell<HashMap<String, Mailbox>>>,
    endpoint: String,
    marked: Vec<u32>,
}

impl MailboxConnector for FakeMailboxes {
    type Session = FakeSession;

    async fn connect(&self, endpoint: &Endpoint) -> Result<FakeSession> {
        let mut boxes = self.boxes.borrow_mut();
        let mailbox = boxes.entry(endpoint.id.clone()).or_default();
        mailbox.connects += 1;
        if mailbox.reject_login {
            return Err(ProbeError::authentication(&endpoint.id, "-ERR invalid password"));
        }

        let connects = mailbox.connects;
        let (due, later): (Vec<_>, Vec<_>) = mailbox
            .scheduled
            .drain(..)
            .partition(|(on, _)| *on <= connects);
        mailbox.scheduled = later;
        mailbox.messages.extend(due.into_iter().map(|(_, raw)| raw));

        Ok(FakeSession {
            boxes: Rc::clone(&self.boxes),
            endpoint: endpoint.id.clone(),
            marked: Vec::new(),
        })
    }
}

impl MailboxSession for FakeSession {
    async fn list(&mut self) -> Result<Vec<MailboxEntry>> {
        let boxes = self.boxes.borrow();
        let mailbox = &boxes[&self.endpoint];
        mailbox.check(&self.endpoint, Fault::List)?;
        Ok(mailbox
            .messages
            .iter()
            .enumerate()
            .map(|(i, raw)| MailboxEntry {
                number: u32::try_from(i + 1).unwrap(),
                size: raw.len() as u64,
            })
            .collect())
    }

    async fn retrieve(&mut self, number: u32) -> Result<Vec<u8>> {
        let mut boxes = self.boxes.borrow_mut();
        let mailbox = boxes.get_mut(&self.endpoint).unwrap();
        mailbox.check(&self.endpoint, Fault::Retrieve)?;
        mailbox.retrievals += 1;
        mailbox
            .messages
            .get(number as usize - 1)
            .cloned()
            .ok_or_else(|| ProbeError::mailbox(&self.endpoint, "-ERR no such message"))
    }

    async fn delete(&mut self, number: u32) -> Result<()> {
        self.boxes.borrow()[&self.endpoint].check(&self.endpoint, Fault::Delete)?;
        self.marked.push(number);
        Ok(())
    }

    async fn quit(mut self) -> Result<()> {
        let mut boxes = self.boxes.borrow_mut();
        let mailbox = boxes.get_mut(&self.endpoint).unwrap();
        // A refused QUIT commits nothing.
        mailbox.check(&self.endpoint, Fault::Quit)?;
        self.marked.sort_unstable_by(|a, b| b.cmp(a));
        for number in self.marked {
            let raw = mailbox.messages.remove(number as usize - 1);
            mailbox.deleted.push(raw);
        }
        mailbox.quits += 1;
        Ok(())
    }
}

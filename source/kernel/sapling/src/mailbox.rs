// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Request/response exchange with an external agent through fixed disk sectors
//! OWNERS: @kernel-team
//! PUBLIC API: Mailbox, Status, REQUEST_SECTOR, RESPONSE_SECTOR, STATUS_SECTOR, MAX_MESSAGE_LEN
//! DEPENDS_ON: disk::{BlockIo, transfer}
//! INVARIANTS: Each sector holds one NUL-terminated, zero-padded string;
//!             the kernel only writes "idle" and "request_sent" to the status sector

use storage_virtio_blk::SECTOR_SIZE;

use crate::disk::{transfer, BlockIo};

pub const REQUEST_SECTOR: u64 = 0;
pub const RESPONSE_SECTOR: u64 = 1;
pub const STATUS_SECTOR: u64 = 2;

/// Largest message including its terminator.
pub const MAX_MESSAGE_LEN: usize = SECTOR_SIZE;

/// Handshake state stored in the status sector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Idle,
    RequestSent,
    ResponseReady,
}

impl Status {
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Status::Idle => b"idle",
            Status::RequestSent => b"request_sent",
            Status::ResponseReady => b"response_ready",
        }
    }

    /// Exact match only; anything else is not a known state.
    pub fn parse(text: &[u8]) -> Option<Self> {
        [Status::Idle, Status::RequestSent, Status::ResponseReady]
            .into_iter()
            .find(|status| status.as_bytes() == text)
    }
}

pub struct Mailbox<'a> {
    disk: &'a mut dyn BlockIo,
}

impl<'a> Mailbox<'a> {
    pub fn new(disk: &'a mut dyn BlockIo) -> Self {
        Self { disk }
    }

    /// Stores `text` in `sector`, truncated so a terminator always fits.
    pub fn write_slot(&mut self, sector: u64, text: &[u8]) -> bool {
        let mut buf = [0u8; SECTOR_SIZE];
        let len = text.len().min(SECTOR_SIZE - 1);
        buf[..len].copy_from_slice(&text[..len]);
        transfer(self.disk, &mut buf, sector, true)
    }

    /// Reads `sector` into `out` and returns the string length before the
    /// first NUL. A failed read yields an empty string. A sector without a
    /// terminator is cut at `SECTOR_SIZE - 1` so the string plus its NUL
    /// still fits in one message.
    pub fn read_slot(&mut self, sector: u64, out: &mut [u8; SECTOR_SIZE]) -> usize {
        out.fill(0);
        if !transfer(self.disk, out, sector, false) {
            out.fill(0);
            return 0;
        }
        match out.iter().position(|&b| b == 0) {
            Some(len) => len,
            None => {
                out[SECTOR_SIZE - 1] = 0;
                SECTOR_SIZE - 1
            }
        }
    }

    pub fn set_status(&mut self, status: Status) -> bool {
        self.write_slot(STATUS_SECTOR, status.as_bytes())
    }

    pub fn status(&mut self) -> Option<Status> {
        let mut buf = [0u8; SECTOR_SIZE];
        let len = self.read_slot(STATUS_SECTOR, &mut buf);
        Status::parse(&buf[..len])
    }

    /// Publishes a request and flags it for the agent.
    pub fn send_request(&mut self, text: &[u8]) {
        self.write_slot(REQUEST_SECTOR, text);
        self.set_status(Status::RequestSent);
    }

    /// Loads the response into `out` if the agent marked one ready. The
    /// status is left untouched until [`Mailbox::acknowledge_response`].
    pub fn pending_response(&mut self, out: &mut [u8; SECTOR_SIZE]) -> Option<usize> {
        if self.status()? != Status::ResponseReady {
            return None;
        }
        Some(self.read_slot(RESPONSE_SECTOR, out))
    }

    pub fn acknowledge_response(&mut self) {
        self.set_status(Status::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RamDisk;

    #[test]
    fn send_then_poll_reports_no_response() {
        let mut disk = RamDisk::new(3);
        disk.put_str(2, "idle");
        let mut mailbox = Mailbox::new(&mut disk);
        mailbox.send_request(b"what is sv32?");

        let mut out = [0u8; SECTOR_SIZE];
        assert_eq!(mailbox.pending_response(&mut out), None);
        assert_eq!(disk.get_str(0), "what is sv32?");
        assert_eq!(disk.get_str(2), "request_sent");
    }

    #[test]
    fn ready_response_is_delivered_then_acknowledged() {
        let mut disk = RamDisk::new(3);
        disk.put_str(1, "paging uses two levels");
        disk.put_str(2, "response_ready");
        let mut mailbox = Mailbox::new(&mut disk);

        let mut out = [0u8; SECTOR_SIZE];
        let len = mailbox.pending_response(&mut out).expect("response");
        assert_eq!(&out[..len], b"paging uses two levels");
        mailbox.acknowledge_response();
        assert_eq!(disk.get_str(2), "idle");
    }

    #[test]
    fn status_must_match_exactly() {
        assert_eq!(Status::parse(b"response_ready"), Some(Status::ResponseReady));
        assert_eq!(Status::parse(b"response_ready!"), None);
        assert_eq!(Status::parse(b""), None);
    }

    #[test]
    fn oversized_slot_text_keeps_terminator() {
        let mut disk = RamDisk::new(3);
        let long = [b'x'; SECTOR_SIZE + 10];
        assert!(Mailbox::new(&mut disk).write_slot(0, &long));
        assert_eq!(disk.sectors[0][SECTOR_SIZE - 1], 0);
        assert_eq!(disk.get_str(0).len(), SECTOR_SIZE - 1);
    }

    #[test]
    fn unterminated_response_is_cut_before_the_last_byte() {
        let mut disk = RamDisk::new(3);
        disk.sectors[1] = [b'x'; SECTOR_SIZE];
        disk.put_str(2, "response_ready");
        let mut mailbox = Mailbox::new(&mut disk);

        let mut out = [0u8; SECTOR_SIZE];
        assert_eq!(mailbox.pending_response(&mut out), Some(MAX_MESSAGE_LEN - 1));
        assert_eq!(out[SECTOR_SIZE - 1], 0);
    }

    #[test]
    fn unreadable_status_means_no_response() {
        let mut disk = RamDisk::new(2);
        let mut out = [0xffu8; SECTOR_SIZE];
        assert_eq!(Mailbox::new(&mut disk).pending_response(&mut out), None);
    }
}

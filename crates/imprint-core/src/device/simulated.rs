//! In-memory device
//!
//! Behaves like a fixed-capacity block device: writes past the end are
//! accepted partially, reads stop at the end. Faults can be scheduled on a
//! given write call to exercise the failure paths of the pipelines without
//! real hardware.

use super::{DeviceAccess, DeviceReader, DeviceWrite, DeviceWriter};
use crate::error::{Error, Result};
use async_trait::async_trait;
use imprint_platform::MBR_SIZE;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Operation observed by a [`SimulatedDevice`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Boot sector erase of the given device path
    Erase(String),
    /// Device opened for writing
    OpenWrite(String),
    /// One write call
    Write {
        /// Position of the write
        offset: u64,
        /// Bytes offered
        len: usize,
        /// Bytes accepted
        accepted: usize,
    },
    /// Write handle synced
    Sync,
    /// Device opened for reading
    OpenRead(String),
}

#[derive(Debug, Default, Clone)]
struct Faults {
    short_write_on: Option<usize>,
    invalid_argument_on: Option<usize>,
    unwritable: bool,
    erase_accepts: Option<usize>,
    unreadable: bool,
}

#[derive(Debug, Default)]
struct State {
    data: Vec<u8>,
    events: Vec<DeviceEvent>,
    write_calls: usize,
    faults: Faults,
}

/// A fixed-capacity device held in memory
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    state: Arc<Mutex<State>>,
}

impl SimulatedDevice {
    /// A zero-filled device of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self::with_contents(vec![0u8; capacity])
    }

    /// A device holding `data`; its capacity is `data.len()`
    pub fn with_contents(data: Vec<u8>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                data,
                ..State::default()
            })),
        }
    }

    /// Make the `call`-th write call (1-based) accept only half its bytes
    pub fn fail_write_short_on(self, call: usize) -> Self {
        self.lock().faults.short_write_on = Some(call);
        self
    }

    /// Make the `call`-th write call (1-based) fail with `EINVAL`
    pub fn fail_write_invalid_on(self, call: usize) -> Self {
        self.lock().faults.invalid_argument_on = Some(call);
        self
    }

    /// Make the boot sector erase accept only `accepted` bytes
    pub fn fail_erase_after(self, accepted: usize) -> Self {
        self.lock().faults.erase_accepts = Some(accepted);
        self
    }

    /// Make opening the device for writing fail with `EINVAL`
    pub fn fail_open_write(self) -> Self {
        self.lock().faults.unwritable = true;
        self
    }

    /// Make opening the device for reading fail
    pub fn fail_open_read(self) -> Self {
        self.lock().faults.unreadable = true;
        self
    }

    /// Current device contents
    pub fn contents(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    /// Overwrite a single byte, e.g. to simulate corruption
    pub fn set_byte(&self, offset: usize, value: u8) {
        if let Some(byte) = self.lock().data.get_mut(offset) {
            *byte = value;
        }
    }

    /// Every operation seen so far, in order
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.lock().events.clone()
    }

    /// Number of write calls made through write handles
    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }

    /// Device capacity in bytes
    pub fn capacity(&self) -> usize {
        self.lock().data.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl DeviceAccess for SimulatedDevice {
    async fn erase_mbr(&self, device: &str) -> Result<()> {
        let mut state = self.lock();
        state.events.push(DeviceEvent::Erase(device.to_string()));

        let accepted = state
            .faults
            .erase_accepts
            .unwrap_or(MBR_SIZE)
            .min(MBR_SIZE)
            .min(state.data.len());
        state.data[..accepted].fill(0);

        if accepted != MBR_SIZE {
            return Err(Error::ShortWrite {
                expected: MBR_SIZE,
                actual: accepted,
            });
        }
        Ok(())
    }

    async fn open_write(&self, device: &str) -> Result<DeviceWriter> {
        let mut state = self.lock();
        state.events.push(DeviceEvent::OpenWrite(device.to_string()));
        if state.faults.unwritable {
            return Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::InvalidInput,
            )));
        }
        drop(state);

        Ok(Box::new(SimulatedHandle {
            state: Arc::clone(&self.state),
            pos: 0,
        }))
    }

    async fn open_read(&self, device: &str) -> Result<DeviceReader> {
        let mut state = self.lock();
        state.events.push(DeviceEvent::OpenRead(device.to_string()));
        if state.faults.unreadable {
            return Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            )));
        }
        drop(state);

        Ok(Box::new(SimulatedHandle {
            state: Arc::clone(&self.state),
            pos: 0,
        }))
    }
}

/// Read or write handle onto a [`SimulatedDevice`]
struct SimulatedHandle {
    state: Arc<Mutex<State>>,
    pos: u64,
}

#[async_trait]
impl DeviceWrite for SimulatedHandle {
    async fn write_chunk(&mut self, buf: &[u8], offset: Option<u64>) -> std::io::Result<usize> {
        let offset = offset.unwrap_or(self.pos);
        let mut state = lock(&self.state);
        state.write_calls += 1;
        let call = state.write_calls;

        if state.faults.invalid_argument_on == Some(call) {
            return Err(std::io::Error::from(std::io::ErrorKind::InvalidInput));
        }

        let capacity = state.data.len() as u64;
        let room = capacity.saturating_sub(offset) as usize;
        let mut accepted = buf.len().min(room);
        if state.faults.short_write_on == Some(call) {
            accepted /= 2;
        }

        if accepted > 0 {
            let start = offset as usize;
            state.data[start..start + accepted].copy_from_slice(&buf[..accepted]);
        }
        state.events.push(DeviceEvent::Write {
            offset,
            len: buf.len(),
            accepted,
        });

        self.pos = offset + accepted as u64;
        Ok(accepted)
    }

    async fn sync(&mut self) -> std::io::Result<()> {
        lock(&self.state).events.push(DeviceEvent::Sync);
        Ok(())
    }
}

impl AsyncRead for SimulatedHandle {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let state = lock(&this.state);

        let start = (this.pos as usize).min(state.data.len());
        let end = state.data.len().min(start + buf.remaining());
        buf.put_slice(&state.data[start..end]);

        this.pos += (end - start) as u64;
        Poll::Ready(Ok(()))
    }
}

//! Audio capture subsystem.
//!
//! Owns the microphone for the duration of one SOS session: acquires the
//! capture device, buffers chunks while capturing, and on stop flushes the
//! buffer into a single artifact which is uploaded to object storage.

pub mod capture;
pub mod device;

pub use capture::{AudioCapture, CaptureState};
pub use device::{AudioChunk, CaptureError, CaptureHandle, DeviceGuard, MediaSource};

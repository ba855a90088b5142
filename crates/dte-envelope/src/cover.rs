//! Cover sheet (`Caratula`) fields supplied by the caller at seal time.

use chrono::NaiveDate;
use dte_core::Rut;
use serde::{Deserialize, Serialize};

/// Caller-supplied cover sheet fields.
///
/// `emitter` and `receiver` may be left out; the assembler then takes them
/// from the first document in the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverSheet {
    /// Person submitting the envelope (`RutEnvia`), the certificate holder.
    pub sender: Rut,
    /// Emitting business (`RutEmisor`).
    pub emitter: Option<Rut>,
    /// Receiver (`RutReceptor`).
    pub receiver: Option<Rut>,
    /// Authority resolution date (`FchResol`).
    pub resolution_date: NaiveDate,
    /// Authority resolution number (`NroResol`). Zero in certification.
    pub resolution_number: u32,
}

impl CoverSheet {
    /// Cover sheet with inferred emitter and receiver.
    pub fn new(sender: Rut, resolution_date: NaiveDate, resolution_number: u32) -> Self {
        Self {
            sender,
            emitter: None,
            receiver: None,
            resolution_date,
            resolution_number,
        }
    }

    /// Set the emitter explicitly.
    pub fn with_emitter(mut self, emitter: Rut) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Set the receiver explicitly.
    pub fn with_receiver(mut self, receiver: Rut) -> Self {
        self.receiver = Some(receiver);
        self
    }
}

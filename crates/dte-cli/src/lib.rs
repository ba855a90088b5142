//! # dte-cli — CLI Tool for the DTE Stack
//!
//! Provides the `dte` command-line interface over the library crates.
//!
//! ## Subcommands
//!
//! - `dte caf` — Validate a folio authorization and print what it grants.
//! - `dte stamp` — Stamp a document (optionally signing it).
//! - `dte sign` — Sign a stamped document.
//! - `dte verify` — Verify signatures and stamps in a document or envelope.
//! - `dte envelope` — Seal signed documents into an envelope.
//! - `dte send` — Authenticate and upload an envelope to the authority.
//!
//! ```bash
//! dte caf caf33.xml --authority-keys keys/
//! dte stamp factura.xml --caf caf33.xml --authority-keys keys/ --sign -o firmada.xml
//! dte envelope firmada.xml --sender 11111111-1 --resolution-date 2014-08-22 --resolution-number 0 -o envio.xml
//! dte send envio.xml --environment certification
//! ```
//!
//! Every subcommand returns its process exit code; errors exit with 1.

pub mod caf;
pub mod common;
pub mod envelope;
pub mod send;
pub mod sign;
pub mod stamp;
pub mod verify;

#[cfg(test)]
mod test_support;

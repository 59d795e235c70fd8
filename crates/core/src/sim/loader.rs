//! Raw binary loader.
//!
//! Reads a flat binary image and places it into physical memory through
//! the system's uncached write path, so stale cached copies cannot shadow
//! the freshly loaded code. ELF segment extraction happens upstream; the
//! core consumes placed bytes only.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{event, Level};

use crate::common::Word;
use crate::soc::{BusFault, System};

/// Reads a flat binary image from disk.
pub fn load_binary<P: AsRef<Path>>(path: P) -> io::Result<Vec<u8>> {
    fs::read(path)
}

/// Places `data` into physical memory starting at `padr`.
pub fn load_at(system: &mut System, padr: Word, data: &[u8]) -> Result<(), BusFault> {
    event!(Level::DEBUG, padr, len = data.len(), "loading image");
    system.write_phys(padr, data)
}

/// Convenience: reads an image and places it in one call.
pub fn load_file_at<P: AsRef<Path>>(
    system: &mut System,
    padr: Word,
    path: P,
) -> io::Result<Result<(), BusFault>> {
    let data = load_binary(path)?;
    Ok(load_at(system, padr, &data))
}

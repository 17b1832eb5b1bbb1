//! Transparent gzip handling (C4, §4.1): detect a gzip stream by `.gz`
//! extension or magic bytes, and actually decompress it (the original
//! `file_utils.py` only detected compression; parsing libraries elsewhere
//! in that codebase relied on an external shell step to decompress first).

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Sniff the first two bytes of `path` for the gzip magic number, falling
/// back to `false` if the file is empty or unreadable.
pub fn sniff_gzip_magic(path: &Path) -> std::io::Result<bool> {
	let mut file = File::open(path)?;
	let mut buf = [0u8; 2];
	match file.read_exact(&mut buf) {
		Ok(()) => Ok(buf == GZIP_MAGIC),
		Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
		Err(e) => Err(e),
	}
}

/// `true` if `path` should be treated as gzip-compressed: either it carries
/// a `.gz` suffix, or its content begins with the gzip magic number.
pub fn is_gzip(path: &Path) -> std::io::Result<bool> {
	if path.extension().and_then(|e| e.to_str()) == Some("gz") {
		return Ok(true);
	}
	sniff_gzip_magic(path)
}

/// Open `path` for buffered line-oriented reading, transparently
/// decompressing gzip content regardless of extension.
pub fn open_auto_decompress(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
	let file = File::open(path)?;
	if is_gzip(path)? {
		Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
	} else {
		Ok(Box::new(BufReader::new(file)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use flate2::write::GzEncoder;
	use flate2::Compression;
	use std::io::Write;
	use tempfile::tempdir;

	#[test]
	fn detects_magic_bytes_without_gz_extension() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("access.log");
		let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
		encoder.write_all(b"hello world\n").unwrap();
		encoder.finish().unwrap();

		assert!(is_gzip(&path).unwrap());
	}

	#[test]
	fn plain_text_is_not_gzip() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("access.log");
		std::fs::write(&path, "plain text\n").unwrap();
		assert!(!is_gzip(&path).unwrap());
	}

	#[test]
	fn open_auto_decompress_reads_through_gzip() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("access.log.gz");
		let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
		encoder.write_all(b"line one\nline two\n").unwrap();
		encoder.finish().unwrap();

		let mut reader = open_auto_decompress(&path).unwrap();
		let mut first_line = String::new();
		reader.read_line(&mut first_line).unwrap();
		assert_eq!(first_line, "line one\n");
	}
}

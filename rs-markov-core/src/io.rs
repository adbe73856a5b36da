use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::{env, fs, io};

use tempfile::NamedTempFile;

use crate::errors::ChainResult;
use crate::model::snapshot::CorpusSnapshot;

/// Reads a text file and returns all its lines as a `Vec<String>`.
///
/// - Reads the entire file into memory
/// - Splits on `\n` / `\r\n`
pub fn read_file<P: AsRef<Path>>(filename: P) -> io::Result<Vec<String>> {
	let mut contents = String::new();
	File::open(filename)?.read_to_string(&mut contents)?;
	Ok(contents.lines().map(str::to_owned).collect())
}

/// Builds an output path based on an input path and a new extension.
///
/// Example:
/// `data/general.txt` + `"bin"` → `data/general.bin`
pub fn build_output_path<P: AsRef<Path>>(input_path: P, output_extension: &str) -> io::Result<PathBuf> {
	let input_path = input_path.as_ref();

	let parent = input_path.parent().unwrap_or_else(|| Path::new("."));
	let file_stem = input_path
		.file_stem()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Input path has no filename"))?;

	let mut output = PathBuf::from(parent);
	output.push(file_stem);
	output.set_extension(output_extension);

	Ok(output)
}

/// Path of the backup kept next to a snapshot.
///
/// Example: `data/general.bin` → `data/general.bin.bak`
pub fn backup_path<P: AsRef<Path>>(path: P) -> PathBuf {
	let mut backup = path.as_ref().as_os_str().to_owned();
	backup.push(".bak");
	PathBuf::from(backup)
}

/// Extracts the base filename without extension.
///
/// Examples:
/// - `"./data/general.txt"` → `"general"`
/// - `"general.txt"` → `"general"`
pub fn get_filename<P: AsRef<Path>>(input_path: P) -> io::Result<String> {
	let stem = input_path
		.as_ref()
		.file_stem()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Path has no filename"))?;

	Ok(stem.to_string_lossy().to_string())
}

/// Normalize a folder path.
///
/// - `"."` or `"./"` resolves to the current working directory
/// - Other paths are returned as-is (not canonicalized)
pub fn normalize_folder(input: &str) -> PathBuf {
	if input == "." || input == "./" {
		env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
	} else {
		PathBuf::from(input)
	}
}

/// Lists all files with a given extension in a directory.
///
/// Returns file names only (no paths), sorted.
pub fn list_files<P: AsRef<Path>>(dir: P, extension: &str) -> io::Result<Vec<String>> {
	let mut files = Vec::new();

	for entry in fs::read_dir(dir)? {
		let path = entry?.path();

		if path.is_file() && path.extension() == Some(std::ffi::OsStr::new(extension)) {
			if let Some(name) = path.file_name() {
				files.push(name.to_string_lossy().to_string());
			}
		}
	}
	files.sort();

	Ok(files)
}

/// Writes a postcard-encoded snapshot to `path`.
///
/// - An existing file is first copied to its `.bak` sibling
/// - The new content goes to a temporary file in the same directory,
///   renamed over `path` once complete, so readers never see a partial write
pub fn save_snapshot<P: AsRef<Path>>(snapshot: &CorpusSnapshot, path: P) -> ChainResult<()> {
	let path = path.as_ref();
	let parent = match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent,
		_ => Path::new("."),
	};
	fs::create_dir_all(parent)?;

	if path.exists() {
		fs::copy(path, backup_path(path))?;
	}

	let bytes = postcard::to_stdvec(snapshot)?;
	let temp_file = NamedTempFile::new_in(parent)?;
	{
		let mut writer = BufWriter::new(temp_file.as_file());
		writer.write_all(&bytes)?;
		writer.flush()?;
	}
	temp_file.persist(path).map_err(|e| e.error)?;

	log::info!("Snapshot {} saved ({} bytes)", path.display(), bytes.len());
	Ok(())
}

/// Reads a postcard-encoded snapshot.
///
/// If `path` cannot be read or decoded but a `.bak` sibling exists, the
/// backup is restored over `path` and loaded instead.
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> ChainResult<CorpusSnapshot> {
	let path = path.as_ref();
	match read_snapshot(path) {
		Ok(snapshot) => {
			log::info!("Snapshot {} has been loaded", path.display());
			Ok(snapshot)
		}
		Err(e) => {
			let backup = backup_path(path);
			if !backup.exists() {
				return Err(e);
			}
			log::warn!(
				"Snapshot {} is unreadable ({}), restoring {}",
				path.display(),
				e,
				backup.display()
			);
			let snapshot = read_snapshot(&backup)?;
			fs::copy(&backup, path)?;
			Ok(snapshot)
		}
	}
}

fn read_snapshot(path: &Path) -> ChainResult<CorpusSnapshot> {
	let bytes = fs::read(path)?;
	Ok(postcard::from_bytes(&bytes)?)
}

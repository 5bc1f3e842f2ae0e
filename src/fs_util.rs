use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use camino::Utf8Path;
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::KiraError;

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KiraError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".kira-sra")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| KiraError::Filesystem(format!("write {path}: {err}")))?;
    Ok(())
}

/// Gzips every regular `*.fastq` file directly inside `dir` into
/// `<name>.fastq.gz` and removes the original. Returns the number of files
/// compressed; a directory without FASTQ files is not an error.
pub fn gzip_fastq_files(dir: &Utf8Path) -> Result<usize, KiraError> {
    let mut compressed = 0;
    for path in regular_files(dir.as_std_path())? {
        let is_fastq = path
            .extension()
            .and_then(|value| value.to_str())
            .map(|value| value.eq_ignore_ascii_case("fastq"))
            .unwrap_or(false);
        if !is_fastq {
            continue;
        }
        gzip_file(&path)?;
        compressed += 1;
    }
    Ok(compressed)
}

fn gzip_file(path: &Path) -> Result<PathBuf, KiraError> {
    let mut target = path.as_os_str().to_os_string();
    target.push(".gz");
    let target = PathBuf::from(target);

    let mut input = fs::File::open(path)
        .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", path.display())))?;
    let output =
        fs::File::create(&target).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    encoder
        .finish()
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    fs::remove_file(path).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Ok(target)
}

/// Names of regular files directly inside `dir` whose name contains
/// `run_id`, sorted.
pub fn list_run_files(dir: &Utf8Path, run_id: &str) -> Result<Vec<String>, KiraError> {
    if run_id.is_empty() {
        return Ok(Vec::new());
    }
    let mut names = regular_files(dir.as_std_path())?
        .into_iter()
        .filter_map(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
        })
        .filter(|name| name.contains(run_id))
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

fn regular_files(dir: &Path) -> Result<Vec<PathBuf>, KiraError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| KiraError::Filesystem(format!("read {}: {err}", dir.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use camino::Utf8PathBuf;
    use flate2::read::GzDecoder;

    use super::*;

    fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, path)
    }

    #[test]
    fn gzip_replaces_fastq_and_skips_others() {
        let (_temp, dir) = temp_dir();
        fs::write(dir.join("SRR1_1.fastq"), b"@r1\nACGT\n+\nIIII\n").unwrap();
        fs::write(dir.join("SRR1_2.fastq.gz"), b"already").unwrap();
        fs::write(dir.join("notes.txt"), b"x").unwrap();

        assert_eq!(gzip_fastq_files(&dir).unwrap(), 1);
        assert!(!dir.join("SRR1_1.fastq").exists());

        let mut decoded = String::new();
        GzDecoder::new(fs::File::open(dir.join("SRR1_1.fastq.gz")).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "@r1\nACGT\n+\nIIII\n");
        assert_eq!(fs::read(dir.join("SRR1_2.fastq.gz")).unwrap(), b"already");
    }

    #[test]
    fn gzip_without_matches_is_noop() {
        let (_temp, dir) = temp_dir();
        assert_eq!(gzip_fastq_files(&dir).unwrap(), 0);
    }

    #[test]
    fn list_run_files_ignores_directories() {
        let (_temp, dir) = temp_dir();
        fs::create_dir(dir.join("SRR1")).unwrap();
        fs::write(dir.join("SRR1_2.fastq"), b"").unwrap();
        fs::write(dir.join("SRR1_1.fastq"), b"").unwrap();
        fs::write(dir.join("SRR2.fastq"), b"").unwrap();

        let files = list_run_files(&dir, "SRR1").unwrap();
        assert_eq!(files, vec!["SRR1_1.fastq", "SRR1_2.fastq"]);
    }

    #[test]
    fn atomic_write_creates_parent() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("nested").join("raw.xml");
        write_bytes_atomic(&path, b"<xml/>").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"<xml/>");
    }
}

//! Matrix Market reader for the graph adjacency
//!
//! Parsing is done by `sprs`. The size line and entry indices are scanned
//! first so a corrupt header is reported as an error.

use anyhow::{Context, Result};
use sprs::TriMat;
use std::io::{BufRead, Cursor, Read};
use std::path::Path;
use tracing::debug;

use crate::tensors::Adjacency;

/// Load a Matrix Market file into CSR form
pub fn load_mtx<P: AsRef<Path>>(path: P) -> Result<Adjacency> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open Matrix Market file: {:?}", path))?;
    let matrix = read_mtx(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse Matrix Market file: {:?}", path))?;
    debug!(
        "Loaded {:?}: {}x{}, {} stored entries",
        path,
        matrix.rows(),
        matrix.cols(),
        matrix.nnz()
    );
    Ok(matrix)
}

/// Parse Matrix Market coordinate data from a reader
///
/// Duplicate coordinates add up; symmetric files are mirrored.
pub fn read_mtx<R: BufRead>(mut reader: R) -> Result<Adjacency> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    scan_entries(&text)?;

    let triplets: TriMat<f32> =
        sprs::io::read_matrix_market_from_bufread(&mut Cursor::new(text.as_bytes()))
            .map_err(|e| anyhow::anyhow!("Unreadable Matrix Market data: {}", e))?;
    Ok(triplets.to_csr())
}

/// Check the size line against the entries that follow it
fn scan_entries(text: &str) -> Result<()> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('%'));

    let size_line = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("Missing size line"))?;
    let sizes: Vec<usize> = size_line
        .split_whitespace()
        .map(|s| s.parse::<usize>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("Invalid size line: {:?}", size_line))?;
    let &[rows, columns, entries] = sizes.as_slice() else {
        anyhow::bail!("Size line needs rows, columns and entries: {:?}", size_line);
    };

    let mut seen = 0usize;
    for line in lines {
        let mut parts = line.split_whitespace();
        check_index(parts.next(), rows, line)?;
        check_index(parts.next(), columns, line)?;
        seen += 1;
    }

    if seen != entries {
        anyhow::bail!("Header announces {} entries, found {}", entries, seen);
    }
    Ok(())
}

/// One-based index within `1..=bound`
fn check_index(token: Option<&str>, bound: usize, line: &str) -> Result<()> {
    let index = token
        .ok_or_else(|| anyhow::anyhow!("Missing index in entry {:?}", line))?
        .parse::<usize>()
        .with_context(|| format!("Invalid index in entry {:?}", line))?;
    if index == 0 || index > bound {
        anyhow::bail!("Index {} out of range 1..={} in entry {:?}", index, bound, line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensors::row_sums;

    fn parse(text: &str) -> Result<Adjacency> {
        read_mtx(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_general_real() {
        let m = parse(
            "%%MatrixMarket matrix coordinate real general\n\
             % written by the pipeline\n\
             3 3 3\n\
             1 1 1.0\n\
             2 3 0.5\n\
             3 2 2\n",
        )
        .unwrap();
        assert_eq!((m.rows(), m.cols(), m.nnz()), (3, 3, 3));
        assert!(m.is_csr());
        assert_eq!(row_sums(&m), vec![1.0, 0.5, 2.0]);
    }

    #[test]
    fn test_symmetric_mirrors_off_diagonal() {
        let m = parse(
            "%%MatrixMarket matrix coordinate real symmetric\n\
             3 3 2\n\
             1 1 4.0\n\
             3 1 1.0\n",
        )
        .unwrap();
        assert_eq!(m.nnz(), 3);
        assert_eq!(row_sums(&m), vec![5.0, 0.0, 1.0]);
    }

    #[test]
    fn test_pattern_field() {
        let m = parse(
            "%%MatrixMarket matrix coordinate pattern general\n\
             2 2 2\n\
             1 2\n\
             2 1\n",
        )
        .unwrap();
        assert_eq!(row_sums(&m), vec![1.0, 1.0]);
    }

    #[test]
    fn test_skew_symmetric() {
        let m = parse(
            "%%MatrixMarket matrix coordinate integer skew-symmetric\n\
             2 2 1\n\
             2 1 3\n",
        )
        .unwrap();
        assert_eq!(row_sums(&m), vec![-3.0, 3.0]);
    }

    #[test]
    fn test_index_out_of_range() {
        let result = parse(
            "%%MatrixMarket matrix coordinate real general\n\
             2 2 1\n\
             3 1 1.0\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_entry_count_mismatch() {
        let result = parse(
            "%%MatrixMarket matrix coordinate real general\n\
             2 2 2\n\
             1 1 1.0\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_huge_entry_count_is_an_error() {
        let result = parse(
            "%%MatrixMarket matrix coordinate real symmetric\n\
             2 2 18446744073709551615\n\
             1 1 1.0\n",
        );
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("announces"));
    }

    #[test]
    fn test_array_format_rejected() {
        let result = parse("%%MatrixMarket matrix array real general\n2 2\n1\n2\n3\n4\n");
        assert!(result.is_err());
    }
}

//! Splitting the input call file into tasks.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use svpipe_core::{TaskId, WorkUnit};

/// A chunk of input lines processed by one worker.
///
/// Lines are kept raw; parsing happens on the worker so a malformed record
/// fails only its own task.
#[derive(Debug, Clone)]
pub struct RegionTask {
    pub id: TaskId,
    /// 1-based input line number of the first entry in `lines`.
    pub first_line: usize,
    pub lines: Vec<(usize, String)>,
}

impl WorkUnit for RegionTask {
    fn id(&self) -> TaskId {
        self.id
    }
}

/// Split non-blank lines into tasks of at most `chunk_size` lines each.
pub fn split_tasks<R: BufRead>(reader: R, chunk_size: usize) -> io::Result<Vec<RegionTask>> {
    let chunk_size = chunk_size.max(1);
    let mut tasks = Vec::new();
    let mut current: Vec<(usize, String)> = Vec::with_capacity(chunk_size);

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        current.push((idx + 1, line));
        if current.len() == chunk_size {
            push_task(&mut tasks, std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        push_task(&mut tasks, current);
    }
    Ok(tasks)
}

/// Read `path` and split it into tasks.
pub fn read_tasks(path: &Path, chunk_size: usize) -> io::Result<Vec<RegionTask>> {
    split_tasks(BufReader::new(File::open(path)?), chunk_size)
}

fn push_task(tasks: &mut Vec<RegionTask>, lines: Vec<(usize, String)>) {
    let first_line = lines.first().map(|(n, _)| *n).unwrap_or(0);
    tasks.push(RegionTask {
        id: TaskId::new(tasks.len() as u64),
        first_line,
        lines,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_split_into_chunks() {
        let input = "a\nb\n\nc\nd\ne\n";
        let tasks = split_tasks(Cursor::new(input), 2).unwrap();

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].id, TaskId::new(0));
        assert_eq!(tasks[0].lines, vec![(1, "a".to_string()), (2, "b".to_string())]);
        assert_eq!(tasks[1].first_line, 4);
        assert_eq!(tasks[2].lines, vec![(6, "e".to_string())]);
    }

    #[test]
    fn test_empty_input_has_no_tasks() {
        assert!(split_tasks(Cursor::new("\n\n"), 10).unwrap().is_empty());
    }

    #[test]
    fn test_zero_chunk_size_is_one() {
        let tasks = split_tasks(Cursor::new("a\nb\n"), 0).unwrap();
        assert_eq!(tasks.len(), 2);
    }
}

use crate::scheduler::response::JobId;

/// Lists the user's pending and running jobs
pub const STATUS_COMMAND: &str = "qstat";

/// One row of the queue listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: JobId,
    /// Scheduler state code, e.g. `qw` or `r`
    pub state: String,
}

/// Read the queue listing printed by [`STATUS_COMMAND`]
///
/// ```text
/// job-ID  prior   name  user    state submit/start at     queue        slots ja-task-ID
/// -----------------------------------------------------------------------------------
///  123456 0.50000 fold  jzhang  r     10/17/2023 10:00:00 long.q@n1        1 1
/// ```
///
/// An empty listing means no jobs are queued. Array jobs appear once per task group with the
/// same id in the first column.
pub fn parse_queue(stdout: &str) -> Vec<QueueEntry> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with("job-ID"))
        .filter(|line| !line.trim().chars().all(|c| c == '-'))
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let id = columns.next()?;
            let state = columns.nth(3).unwrap_or_default();
            Some(QueueEntry {
                id: JobId::new(id),
                state: state.to_string(),
            })
        })
        .collect()
}

/// The job's first row in the listing, `None` once the scheduler no longer lists it
pub fn find_entry<'a>(entries: &'a [QueueEntry], id: &JobId) -> Option<&'a QueueEntry> {
    entries.iter().find(|entry| &entry.id == id)
}

pub fn cancel_command(id: &JobId) -> String {
    format!("qdel {id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    static LISTING: &str = "\
job-ID  prior   name       user         state submit/start at     queue                          slots ja-task-ID
-----------------------------------------------------------------------------------------------------------------
 123456 0.50000 fold       jzhang       r     10/17/2023 10:00:00 long.q@qb3-id1                     1 1
 123456 0.50000 fold       jzhang       r     10/17/2023 10:00:01 long.q@qb3-id2                     1 2
 123457 0.00000 other      jzhang       qw    10/17/2023 10:05:00                                    1
";

    #[test]
    fn test_parse_listing() {
        let entries = parse_queue(LISTING);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].id, JobId::new("123456"));
        assert_eq!(entries[0].state, "r");
        assert_eq!(entries[2].state, "qw");
        assert_eq!(find_entry(&entries, &JobId::new("123457")).map(|e| e.state.as_str()), Some("qw"));
        assert!(find_entry(&entries, &JobId::new("12345")).is_none());
    }

    #[test]
    fn test_empty_listing() {
        assert!(parse_queue("").is_empty());
        assert!(parse_queue("\n\n").is_empty());
    }

    #[test]
    fn test_cancel_command() {
        assert_eq!(cancel_command(&JobId::new("99")), "qdel 99");
    }
}

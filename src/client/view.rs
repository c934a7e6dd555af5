//! Projections over the cached tasks. Nothing here is stored; every view is
//! recomputed from the collection and the current date.

use chrono::{Local, NaiveDate};
use std::cmp::Reverse;
use serde::Serialize;

use crate::models::{STATE_DONE, STATE_IN_PROGRESS, STATE_TODO, Task, TaskState};

/// Local calendar date, the reference point for overdue and due-today
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn is_overdue(task: &Task, today: NaiveDate) -> bool {
    !task.is_done() && task.data_fine < today
}

pub fn is_due_today(task: &Task, today: NaiveDate) -> bool {
    task.data_fine == today
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub todo: usize,
    pub overdue: usize,
    pub due_today: usize,
    /// 0..=100
    pub completion_percentage: u8,
}

pub fn completion_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (100.0 * completed as f64 / total as f64).round() as u8
}

pub fn stats(tasks: &[Task], today: NaiveDate) -> TaskStats {
    let total = tasks.len();
    let completed = count(tasks, |t| t.state_id == STATE_DONE);

    TaskStats {
        total,
        completed,
        in_progress: count(tasks, |t| t.state_id == STATE_IN_PROGRESS),
        todo: count(tasks, |t| t.state_id == STATE_TODO),
        overdue: count(tasks, |t| is_overdue(t, today)),
        due_today: count(tasks, |t| is_due_today(t, today)),
        completion_percentage: completion_percentage(completed, total),
    }
}

fn count(tasks: &[Task], pred: impl Fn(&Task) -> bool) -> usize {
    tasks.iter().filter(|&t| pred(t)).count()
}

/// Overdue tasks first, then by ascending due date. Ties keep collection order.
pub fn display_order(tasks: &[Task], today: NaiveDate) -> Vec<&Task> {
    let mut ordered: Vec<&Task> = tasks.iter().collect();
    ordered.sort_by_key(|t| (!is_overdue(t, today), t.data_fine));
    ordered
}

/// User-selectable orderings for the task list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSort {
    NameAscending,
    NameDescending,
    /// Oldest first
    Added,
    /// Earliest due date first
    DueDate,
}

/// Stable sort by the chosen key. Names compare case-insensitively.
pub fn sorted(tasks: &[Task], sort: TaskSort) -> Vec<&Task> {
    let mut ordered: Vec<&Task> = tasks.iter().collect();
    match sort {
        TaskSort::NameAscending => ordered.sort_by_cached_key(|t| t.nome_task.to_lowercase()),
        TaskSort::NameDescending => {
            ordered.sort_by_cached_key(|t| Reverse(t.nome_task.to_lowercase()))
        }
        TaskSort::Added => ordered.sort_by_key(|t| t.data_aggiunta),
        TaskSort::DueDate => ordered.sort_by_key(|t| t.data_fine),
    }
    ordered
}

pub fn with_state(tasks: &[Task], state_id: i64) -> Vec<&Task> {
    tasks.iter().filter(|t| t.state_id == state_id).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateGroup<'a> {
    pub state_id: i64,
    pub label: &'a str,
    pub tasks: Vec<&'a Task>,
}

/// One group per known state, in lookup order (empty groups included). Tasks
/// in a state missing from the lookup get trailing groups labelled from the
/// task itself.
pub fn group_by_state<'a>(tasks: &'a [Task], states: &'a [TaskState]) -> Vec<StateGroup<'a>> {
    let mut groups: Vec<StateGroup<'a>> = states
        .iter()
        .map(|s| StateGroup {
            state_id: s.id,
            label: &s.nome_stato,
            tasks: Vec::new(),
        })
        .collect();

    for task in tasks {
        match groups.iter_mut().find(|g| g.state_id == task.state_id) {
            Some(group) => group.tasks.push(task),
            None => groups.push(StateGroup {
                state_id: task.state_id,
                label: &task.nome_stato,
                tasks: vec![task],
            }),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn task(id: i64, state_id: i64, due: NaiveDate) -> Task {
        Task {
            id,
            user_id: 1,
            state_id,
            nome_task: format!("task {id}"),
            descrizione: String::new(),
            data_aggiunta: DateTime::<Utc>::UNIX_EPOCH,
            data_fine: due,
            data_completamento: None,
            nome_stato: String::new(),
        }
    }

    #[test]
    fn overdue_excludes_done_and_today() {
        let today = date(2025, 6, 10);
        assert!(is_overdue(&task(1, STATE_TODO, date(2025, 6, 9)), today));
        assert!(!is_overdue(&task(2, STATE_DONE, date(2025, 6, 9)), today));
        assert!(!is_overdue(&task(3, STATE_TODO, today), today));
        assert!(is_due_today(&task(3, STATE_TODO, today), today));
    }

    #[test]
    fn stats_count_every_bucket() {
        let today = date(2025, 6, 10);
        let tasks = vec![
            task(1, STATE_TODO, date(2025, 6, 1)),
            task(2, STATE_IN_PROGRESS, today),
            task(3, STATE_DONE, date(2025, 6, 1)),
        ];

        let stats = stats(&tasks, today);
        assert_eq!(
            stats,
            TaskStats {
                total: 3,
                completed: 1,
                in_progress: 1,
                todo: 1,
                overdue: 1,
                due_today: 1,
                completion_percentage: 33,
            }
        );
    }

    #[test]
    fn percentage_rounds_and_handles_empty() {
        assert_eq!(completion_percentage(0, 0), 0);
        assert_eq!(completion_percentage(2, 3), 67);
        assert_eq!(completion_percentage(1, 8), 13);
        assert_eq!(completion_percentage(4, 4), 100);
    }

    #[test]
    fn display_puts_overdue_first() {
        let today = date(2025, 6, 10);
        let tasks = vec![
            task(1, STATE_TODO, date(2025, 6, 12)),
            task(2, STATE_DONE, date(2025, 6, 1)),
            task(3, STATE_TODO, date(2025, 6, 5)),
            task(4, STATE_TODO, date(2025, 6, 11)),
        ];

        let ids: Vec<_> = display_order(&tasks, today).iter().map(|t| t.id).collect();
        assert_eq!(ids, [3, 2, 4, 1]);
    }

    fn named(id: i64, name: &str, added_secs: i64) -> Task {
        let mut t = task(id, STATE_TODO, date(2025, 1, id as u32));
        t.nome_task = name.into();
        t.data_aggiunta = DateTime::from_timestamp(added_secs, 0).unwrap();
        t
    }

    fn ids(tasks: Vec<&Task>) -> Vec<i64> {
        tasks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn sort_by_name_ignores_case() {
        let tasks = vec![named(1, "pane", 0), named(2, "Acqua", 0), named(3, "latte", 0)];

        assert_eq!(ids(sorted(&tasks, TaskSort::NameAscending)), [2, 3, 1]);
        assert_eq!(ids(sorted(&tasks, TaskSort::NameDescending)), [1, 3, 2]);
    }

    #[test]
    fn sort_by_added_and_due_date() {
        let tasks = vec![named(3, "c", 10), named(1, "a", 30), named(2, "b", 20)];

        assert_eq!(ids(sorted(&tasks, TaskSort::Added)), [3, 2, 1]);
        assert_eq!(ids(sorted(&tasks, TaskSort::DueDate)), [1, 2, 3]);
    }

    #[test]
    fn filter_by_state() {
        let today = date(2025, 6, 10);
        let tasks = vec![
            task(1, STATE_TODO, today),
            task(2, STATE_DONE, today),
            task(3, STATE_TODO, today),
        ];

        assert_eq!(ids(with_state(&tasks, STATE_TODO)), [1, 3]);
        assert_eq!(ids(with_state(&tasks, STATE_DONE)), [2]);
        assert!(with_state(&tasks, STATE_IN_PROGRESS).is_empty());
    }

    #[test]
    fn groups_follow_lookup_order() {
        let states = vec![
            TaskState {
                id: 0,
                nome_stato: "Da fare".into(),
            },
            TaskState {
                id: 2,
                nome_stato: "Completato".into(),
            },
        ];
        let mut orphan = task(3, 7, date(2025, 1, 1));
        orphan.nome_stato = "Archiviato".into();
        let tasks = vec![task(1, 2, date(2025, 1, 1)), task(2, 0, date(2025, 1, 1)), orphan];

        let groups = group_by_state(&tasks, &states);
        let summary: Vec<_> = groups
            .iter()
            .map(|g| (g.label, g.tasks.iter().map(|t| t.id).collect::<Vec<_>>()))
            .collect();
        assert_eq!(
            summary,
            [
                ("Da fare", vec![2]),
                ("Completato", vec![1]),
                ("Archiviato", vec![3]),
            ]
        );
    }
}

//! Ordered task list and structural diff application.

use tracing::warn;

use crate::model::{Task, TaskDiff, TaskId};

/// What a diff did to the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    Added,
    /// `Add` for an id already present, merged as an update.
    Merged,
    Updated,
    Removed { index: usize },
    /// Update or remove for an id that is not in the list.
    UnknownTask(TaskId),
}

impl DiffOutcome {
    #[must_use]
    pub const fn changed(&self) -> bool {
        !matches!(self, Self::UnknownTask(_))
    }
}

/// Ordered task list plus the externally selected task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskList {
    tasks: Vec<Task>,
    selected: Option<TaskId>,
}

impl TaskList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a snapshot, keeping the first occurrence of duplicate ids.
    #[must_use]
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let mut list = Self::new();
        list.set_all(tasks);
        list
    }

    /// Replace every task. Only used when applying a join snapshot.
    ///
    /// The selection survives if its task is still present.
    pub fn set_all(&mut self, tasks: Vec<Task>) {
        self.tasks.clear();
        for task in tasks {
            if self.position(&task.id).is_some() {
                warn!(task_id = %task.id, "duplicate task id in snapshot, keeping first");
                continue;
            }
            self.tasks.push(task);
        }
        if let Some(selected) = &self.selected {
            if self.position(selected).is_none() {
                self.selected = None;
            }
        }
    }

    /// Apply one diff in place.
    pub fn apply(&mut self, diff: TaskDiff) -> DiffOutcome {
        match diff {
            TaskDiff::Add { task } => {
                if let Some(index) = self.position(&task.id) {
                    self.tasks[index] = task;
                    DiffOutcome::Merged
                } else {
                    self.tasks.push(task);
                    DiffOutcome::Added
                }
            }
            TaskDiff::Remove { task_id } => {
                let Some(index) = self.position(&task_id) else {
                    warn!(task_id = %task_id, "remove for unknown task ignored");
                    return DiffOutcome::UnknownTask(task_id);
                };
                self.tasks.remove(index);
                if self.selected.as_ref() == Some(&task_id) {
                    self.selected = self.successor_selection(index);
                }
                DiffOutcome::Removed { index }
            }
            TaskDiff::Update {
                task_id,
                text,
                status,
            } => {
                let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) else {
                    warn!(task_id = %task_id, "update for unknown task ignored");
                    return DiffOutcome::UnknownTask(task_id);
                };
                if let Some(text) = text {
                    task.text = text;
                }
                if let Some(status) = status {
                    task.status = status;
                }
                DiffOutcome::Updated
            }
        }
    }

    // Predecessor of the removed slot, else the new first task, else none.
    fn successor_selection(&self, removed_index: usize) -> Option<TaskId> {
        removed_index
            .checked_sub(1)
            .and_then(|i| self.tasks.get(i))
            .or_else(|| self.tasks.first())
            .map(|t| t.id.clone())
    }

    /// Select a task. Returns false if the id is not in the list.
    pub fn select(&mut self, task_id: &TaskId) -> bool {
        if self.position(task_id).is_some() {
            self.selected = Some(task_id.clone());
            true
        } else {
            false
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    #[must_use]
    pub const fn selected(&self) -> Option<&TaskId> {
        self.selected.as_ref()
    }

    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn get(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == task_id)
    }

    #[must_use]
    pub fn position(&self, task_id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == task_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[must_use]
    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}

/// Pure form of [`TaskList::apply`]: the list after `diff`.
#[must_use]
pub fn apply(tasks: &[Task], diff: TaskDiff) -> Vec<Task> {
    let mut list = TaskList {
        tasks: tasks.to_vec(),
        selected: None,
    };
    list.apply(diff);
    list.tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskStatus;

    fn task(id: &str) -> Task {
        Task::new(id, format!("task {id}"), TaskStatus::Pending)
    }

    fn ids(list: &TaskList) -> Vec<&str> {
        list.tasks().iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_add_update_remove_leaves_nothing() {
        let mut list = TaskList::new();
        list.apply(TaskDiff::Add {
            task: Task::new("A", "t", TaskStatus::Pending),
        });
        list.apply(TaskDiff::Update {
            task_id: TaskId::from("A"),
            text: None,
            status: Some(TaskStatus::Done),
        });
        assert_eq!(list.get(&TaskId::from("A")).unwrap().status, TaskStatus::Done);

        list.select(&TaskId::from("A"));
        list.apply(TaskDiff::Remove {
            task_id: TaskId::from("A"),
        });

        assert!(list.is_empty());
        assert!(list.get(&TaskId::from("A")).is_none());
        assert!(list.selected().is_none());
    }

    #[test]
    fn test_duplicate_add_is_update() {
        let mut list = TaskList::from_tasks(vec![task("A"), task("B")]);
        let outcome = list.apply(TaskDiff::Add {
            task: Task::new("A", "renamed", TaskStatus::InProgress),
        });

        assert_eq!(outcome, DiffOutcome::Merged);
        assert_eq!(ids(&list), vec!["A", "B"]);
        assert_eq!(list.tasks()[0].text, "renamed");
    }

    #[test]
    fn test_update_merges_only_provided_fields() {
        let mut list = TaskList::from_tasks(vec![task("A")]);
        list.apply(TaskDiff::Update {
            task_id: TaskId::from("A"),
            text: Some("new text".into()),
            status: None,
        });

        let a = list.get(&TaskId::from("A")).unwrap();
        assert_eq!(a.text, "new text");
        assert_eq!(a.status, TaskStatus::Pending);
    }

    #[test]
    fn test_unknown_update_is_noop() {
        let mut list = TaskList::from_tasks(vec![task("A")]);
        let before = list.clone();
        let outcome = list.apply(TaskDiff::Update {
            task_id: TaskId::from("Z"),
            text: Some("x".into()),
            status: None,
        });

        assert_eq!(outcome, DiffOutcome::UnknownTask(TaskId::from("Z")));
        assert!(!outcome.changed());
        assert_eq!(list, before);
    }

    #[test]
    fn test_remove_selected_picks_predecessor() {
        let mut list = TaskList::from_tasks(vec![task("A"), task("B"), task("C")]);
        list.select(&TaskId::from("B"));
        list.apply(TaskDiff::Remove {
            task_id: TaskId::from("B"),
        });
        assert_eq!(list.selected(), Some(&TaskId::from("A")));
    }

    #[test]
    fn test_remove_selected_first_falls_back_to_new_first() {
        let mut list = TaskList::from_tasks(vec![task("A"), task("B")]);
        list.select(&TaskId::from("A"));
        list.apply(TaskDiff::Remove {
            task_id: TaskId::from("A"),
        });
        assert_eq!(list.selected(), Some(&TaskId::from("B")));
    }

    #[test]
    fn test_remove_unselected_keeps_selection() {
        let mut list = TaskList::from_tasks(vec![task("A"), task("B"), task("C")]);
        list.select(&TaskId::from("C"));
        list.apply(TaskDiff::Remove {
            task_id: TaskId::from("A"),
        });
        assert_eq!(list.selected(), Some(&TaskId::from("C")));
        assert_eq!(ids(&list), vec!["B", "C"]);
    }

    #[test]
    fn test_set_all_dedupes_and_drops_missing_selection() {
        let mut list = TaskList::from_tasks(vec![task("A")]);
        list.select(&TaskId::from("A"));
        list.set_all(vec![task("B"), task("C"), task("B")]);

        assert_eq!(ids(&list), vec!["B", "C"]);
        assert!(list.selected().is_none());
    }

    #[test]
    fn test_pure_apply_leaves_input_untouched() {
        let tasks = vec![task("A")];
        let next = apply(&tasks, TaskDiff::Add { task: task("B") });
        assert_eq!(tasks.len(), 1);
        assert_eq!(next.len(), 2);
        assert!(!TaskList::from_tasks(vec![]).select(&TaskId::from("A")));
    }
}

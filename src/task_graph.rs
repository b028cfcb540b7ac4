//! Component F: DAG build, cycle detection, readiness, execution order, and
//! gate checks over a mission's tasks.

use std::collections::{HashMap, HashSet};

use crate::error::{MissionControlError, Result};
use crate::models::{Task, TaskId, TaskStatus, TaskType};

/// Fails with `CYCLE_DETECTED` (surfaced as a [`MissionControlError::Validation`]
/// with that message) if adding `new_task`'s deps to `existing` would close a cycle.
pub fn check_for_cycle(existing: &[Task], new_task_id: &TaskId, new_deps: &[TaskId]) -> Result<()> {
    let mut adjacency: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for task in existing {
        adjacency.insert(task.id.clone(), task.deps.clone());
    }
    adjacency.insert(new_task_id.clone(), new_deps.to_vec());

    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();

    fn visit(
        node: &TaskId,
        adjacency: &HashMap<TaskId, Vec<TaskId>>,
        visiting: &mut HashSet<TaskId>,
        visited: &mut HashSet<TaskId>,
    ) -> bool {
        if visited.contains(node) {
            return false;
        }
        if visiting.contains(node) {
            return true;
        }
        visiting.insert(node.clone());
        if let Some(deps) = adjacency.get(node) {
            for dep in deps {
                if visit(dep, adjacency, visiting, visited) {
                    return true;
                }
            }
        }
        visiting.remove(node);
        visited.insert(node.clone());
        false
    }

    if visit(new_task_id, &adjacency, &mut visiting, &mut visited) {
        return Err(MissionControlError::Validation {
            message: "CYCLE_DETECTED".into(),
        });
    }
    Ok(())
}

/// A task is ready iff every dep is complete and it is currently `pending`.
pub fn is_ready(task: &Task, all_tasks: &HashMap<TaskId, Task>) -> bool {
    if task.status != TaskStatus::Pending {
        return false;
    }
    task.deps.iter().all(|dep| {
        all_tasks
            .get(dep)
            .map(|t| t.status == TaskStatus::Complete)
            .unwrap_or(false)
    })
}

/// `getReadyTasks`: tasks currently `pending` with all deps complete, sorted by
/// (taskType priority, creation time, id).
pub fn ready_tasks(tasks: &[Task]) -> Vec<Task> {
    let by_id: HashMap<TaskId, Task> = tasks.iter().map(|t| (t.id.clone(), t.clone())).collect();
    let mut ready: Vec<Task> = tasks.iter().filter(|t| is_ready(t, &by_id)).cloned().collect();
    sort_by_execution_order(&mut ready);
    ready
}

/// `getNextTask`: head of the ready set, or `None`.
pub fn next_task(tasks: &[Task]) -> Option<Task> {
    ready_tasks(tasks).into_iter().next()
}

fn sort_by_execution_order(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.task_type
            .priority()
            .cmp(&b.task_type.priority())
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.as_str().cmp(b.id.as_str()))
    });
}

/// `getExecutionOrder`: topological sort over all tasks with the same tie-break
/// as readiness. Assumes the graph is acyclic (enforced at task-create time).
pub fn execution_order(tasks: &[Task]) -> Vec<TaskId> {
    let mut remaining: HashMap<TaskId, Task> = tasks.iter().map(|t| (t.id.clone(), t.clone())).collect();
    let mut ordered = Vec::new();

    while !remaining.is_empty() {
        let mut frontier: Vec<Task> = remaining
            .values()
            .filter(|t| t.deps.iter().all(|d| !remaining.contains_key(d)))
            .cloned()
            .collect();
        if frontier.is_empty() {
            // A cycle slipped through; stop rather than loop forever.
            break;
        }
        sort_by_execution_order(&mut frontier);
        for task in frontier {
            ordered.push(task.id.clone());
            remaining.remove(&task.id);
        }
    }
    ordered
}

/// `checkTaskGate(task)`: verification tasks must have zero dependents;
/// finalization tasks must be part of the terminal set (nothing non-finalization
/// depends on them transitively being non-terminal); any non-finalization task
/// may not depend on a finalization task.
pub fn check_task_gate(task: &Task, all_tasks: &[Task]) -> Result<()> {
    let dependents: Vec<&Task> = all_tasks.iter().filter(|t| t.deps.contains(&task.id)).collect();

    if task.task_type == TaskType::Verification && !dependents.is_empty() {
        return Err(MissionControlError::Validation {
            message: format!("verification task {} has dependents", task.id),
        });
    }

    if task.task_type != TaskType::Finalization {
        for dep_id in &task.deps {
            if let Some(dep) = all_tasks.iter().find(|t| &t.id == dep_id) {
                if dep.task_type == TaskType::Finalization {
                    return Err(MissionControlError::Validation {
                        message: format!("non-finalization task {} depends on finalization {}", task.id, dep.id),
                    });
                }
            }
        }
    }

    Ok(())
}

/// Checks that `task` may transition to `running`: every dep must be complete.
pub fn check_dependencies_met(task: &Task, all_tasks: &HashMap<TaskId, Task>) -> Result<()> {
    for dep_id in &task.deps {
        let dep_status = all_tasks.get(dep_id).map(|t| t.status);
        if dep_status != Some(TaskStatus::Complete) {
            return Err(MissionControlError::DependencyNotMet {
                task_id: task.id.to_string(),
                dep_id: dep_id.to_string(),
            });
        }
    }
    Ok(())
}

/// ASCII visualization of the DAG: one line per task, `<id> [<type>] <- dep, dep`.
pub fn visualize(tasks: &[Task]) -> String {
    let mut lines = Vec::new();
    let mut sorted = tasks.to_vec();
    sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    for task in &sorted {
        let deps = if task.deps.is_empty() {
            String::new()
        } else {
            format!(
                " <- {}",
                task.deps.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
            )
        };
        lines.push(format!("{} [{:?}/{:?}]{}", task.id, task.task_type, task.status, deps));
    }
    lines.join("\n")
}

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::datastore::{CATEGORIES_SLOT, SlotStorage, Snapshot, TASKS_SLOT, load_slot, save_slot};
use crate::datetime::now_millis;
use crate::filter::TaskFilters;
use crate::notify::{Notification, Notifier};
use crate::task::{Category, Task, TaskDraft, TaskPatch, default_categories, seed_tasks};

/// Owns the task and category lists. Every mutation writes the new snapshot
/// first and only commits it to memory once the write succeeded.
pub struct TaskStore {
    storage: Arc<dyn SlotStorage>,
    notifier: Arc<dyn Notifier>,
    tasks: Vec<Task>,
    categories: Vec<Category>,
}

impl TaskStore {
    /// Reads both slots, seeding (and persisting) defaults for any slot that
    /// is absent or corrupt.
    #[instrument(skip_all)]
    pub fn load(storage: Arc<dyn SlotStorage>, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let tasks = match load_slot::<Vec<Task>>(storage.as_ref(), TASKS_SLOT) {
            Snapshot::Loaded(tasks) => tasks,
            snapshot => {
                set_aside_if_corrupt(storage.as_ref(), TASKS_SLOT, &snapshot)?;
                let seeded = seed_tasks(now_millis());
                info!(count = seeded.len(), "seeding demo tasks");
                save_slot(storage.as_ref(), TASKS_SLOT, &seeded)?;
                seeded
            }
        };

        let categories = match load_slot::<Vec<Category>>(storage.as_ref(), CATEGORIES_SLOT) {
            Snapshot::Loaded(categories) => categories,
            snapshot => {
                set_aside_if_corrupt(storage.as_ref(), CATEGORIES_SLOT, &snapshot)?;
                let seeded = default_categories();
                info!(count = seeded.len(), "seeding default categories");
                save_slot(storage.as_ref(), CATEGORIES_SLOT, &seeded)?;
                seeded
            }
        };

        debug!(
            tasks = tasks.len(),
            categories = categories.len(),
            "task store loaded"
        );

        Ok(Self {
            storage,
            notifier,
            tasks,
            categories,
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn filter(&self, filters: &TaskFilters) -> Vec<&Task> {
        filters.apply(&self.tasks)
    }

    pub fn create(&mut self, draft: TaskDraft) -> anyhow::Result<Task> {
        self.create_at(draft, now_millis())
    }

    /// Appends a new task stamped with `now` (kept to milliseconds, like the
    /// snapshot); the list keeps insertion order.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub fn create_at(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> anyhow::Result<Task> {
        let task = draft.into_task(Uuid::new_v4().to_string(), now.trunc_subsecs(3));

        let mut next = self.tasks.clone();
        next.push(task.clone());
        self.commit(next)?;

        info!(task_id = %task.id, "task created");
        self.notifier.notify(Notification::info(
            "Task created",
            "Your task has been created successfully",
        ));
        Ok(task)
    }

    pub fn update(&mut self, id: &str, patch: TaskPatch) -> anyhow::Result<Option<Task>> {
        self.update_at(id, patch, now_millis())
    }

    /// Merges `patch` over the task in place. Unknown ids are a no-op and
    /// yield `None`.
    #[instrument(skip(self, patch))]
    pub fn update_at(
        &mut self,
        id: &str,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Task>> {
        let Some(idx) = self.tasks.iter().position(|task| task.id == id) else {
            warn!(task_id = %id, "update skipped; task not found");
            return Ok(None);
        };

        let mut next = self.tasks.clone();
        let task = &mut next[idx];
        patch.apply_to(task);
        // Never move backwards even if the wall clock does.
        task.updated_at = now.trunc_subsecs(3).max(task.updated_at);
        let updated = task.clone();
        self.commit(next)?;

        info!(task_id = %id, "task updated");
        self.notifier.notify(Notification::info(
            "Task updated",
            "Your task has been updated successfully",
        ));
        Ok(Some(updated))
    }

    /// Hard removal; returns whether a task was removed.
    #[instrument(skip(self))]
    pub fn delete(&mut self, id: &str) -> anyhow::Result<bool> {
        let mut next = self.tasks.clone();
        next.retain(|task| task.id != id);
        let removed = next.len() != self.tasks.len();
        self.commit(next)?;

        if removed {
            info!(task_id = %id, "task deleted");
        } else {
            debug!(task_id = %id, "delete of unknown task");
        }
        self.notifier.notify(Notification::info(
            "Task deleted",
            "Your task has been deleted successfully",
        ));
        Ok(removed)
    }

    fn commit(&mut self, next: Vec<Task>) -> anyhow::Result<()> {
        save_slot(self.storage.as_ref(), TASKS_SLOT, &next)?;
        self.tasks = next;
        Ok(())
    }
}

/// Keeps an unreadable snapshot around before the slot is re-seeded. If it
/// cannot be moved aside, loading fails instead of overwriting it.
fn set_aside_if_corrupt<T>(
    storage: &dyn SlotStorage,
    slot: &str,
    snapshot: &Snapshot<T>,
) -> anyhow::Result<()> {
    if let Snapshot::Corrupt(err) = snapshot {
        warn!(slot, error = %err, "setting corrupt snapshot aside before seeding");
        storage
            .quarantine(slot)
            .with_context(|| format!("refusing to overwrite unreadable {slot} snapshot"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;
    use chrono::{Duration, TimeZone, Timelike, Utc};

    use super::TaskStore;
    use crate::datastore::{
        CATEGORIES_SLOT, MemorySlotStorage, SlotStorage, TASKS_SLOT, load_slot, quarantine_name,
    };
    use crate::task::Category;
    use crate::filter::{StatusFilter, TaskFilters};
    use crate::notify::RecordingNotifier;
    use crate::task::{CategoryRef, Priority, Status, Task, TaskDraft, TaskPatch};

    fn draft() -> TaskDraft {
        TaskDraft {
            title: "Water plants".to_string(),
            description: "Balcony and kitchen".to_string(),
            due_date: Utc
                .with_ymd_and_hms(2026, 10, 20, 8, 0, 0)
                .single()
                .expect("valid due"),
            category: CategoryRef::ById("garden".to_string()),
            status: Status::Pending,
            priority: Priority::Low,
        }
    }

    fn store() -> (TaskStore, Arc<MemorySlotStorage>, Arc<RecordingNotifier>) {
        let storage = Arc::new(MemorySlotStorage::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let store = TaskStore::load(storage.clone(), notifier.clone()).expect("load store");
        (store, storage, notifier)
    }

    #[test]
    fn absent_slots_seed_and_persist_defaults() {
        let (store, storage, _) = store();
        assert_eq!(store.tasks().len(), 4);
        assert_eq!(store.categories().len(), 3);
        assert!(storage.get(TASKS_SLOT).expect("get").is_some());
        assert!(storage.get(CATEGORIES_SLOT).expect("get").is_some());
    }

    #[test]
    fn create_then_lookup_returns_input_plus_generated_fields() {
        let (mut store, _, notifier) = store();
        let created = store.create(draft()).expect("create");

        let found = store.get_by_id(&created.id).expect("present").clone();
        assert_eq!(found, created);
        assert_eq!(found.title, "Water plants");
        assert_eq!(found.category, CategoryRef::ById("garden".to_string()));
        assert_eq!(found.created_at, found.updated_at);
        assert_eq!(store.tasks().last().map(|t| t.id.as_str()), Some(found.id.as_str()));
        assert_eq!(notifier.titles(), vec!["Task created"]);
    }

    #[test]
    fn rapid_creates_get_distinct_ids() {
        let (mut store, _, _) = store();
        let now = Utc::now();
        let a = store.create_at(draft(), now).expect("create a");
        let b = store.create_at(draft(), now).expect("create b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn update_merges_and_bumps_updated_at_in_place() {
        let (mut store, _, _) = store();
        let before = store.get_by_id("2").expect("seed task").clone();
        let later = before.updated_at + Duration::minutes(5);

        let updated = store
            .update_at("2", TaskPatch::status(Status::Completed), later)
            .expect("update")
            .expect("found");

        assert_eq!(updated.status, Status::Completed);
        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.created_at, before.created_at);
        assert_eq!(updated.title, before.title);
        assert_eq!(updated.description, before.description);
        assert_eq!(updated.priority, before.priority);
        assert_eq!(store.tasks()[1].id, "2");
    }

    #[test]
    fn update_of_unknown_id_is_a_noop() {
        let (mut store, _, notifier) = store();
        let before: Vec<Task> = store.tasks().to_vec();
        let result = store
            .update("missing", TaskPatch::status(Status::Completed))
            .expect("no error");
        assert!(result.is_none());
        assert_eq!(store.tasks(), before.as_slice());
        assert!(notifier.titles().is_empty());
    }

    #[test]
    fn delete_removes_and_unknown_delete_is_noop() {
        let (mut store, storage, _) = store();
        assert!(!store.delete("nope").expect("delete unknown"));
        assert_eq!(store.tasks().len(), 4);

        assert!(store.delete("3").expect("delete"));
        assert_eq!(store.tasks().len(), 3);
        assert!(store.get_by_id("3").is_none());

        let persisted: Vec<Task> = load_slot(storage.as_ref(), TASKS_SLOT)
            .into_option()
            .expect("persisted");
        assert_eq!(persisted, store.tasks());
    }

    #[test]
    fn persisted_tasks_round_trip_on_reload() {
        let (mut store, storage, _) = store();
        store.create(draft()).expect("create");
        let reloaded =
            TaskStore::load(storage.clone(), Arc::new(RecordingNotifier::new())).expect("reload");
        assert_eq!(reloaded.tasks(), store.tasks());
    }

    #[test]
    fn sub_millisecond_instants_match_the_snapshot() {
        let (mut store, storage, _) = store();
        let created_at = Utc
            .timestamp_opt(1_792_000_000, 123_456_789)
            .single()
            .expect("valid instant");
        let created = store.create_at(draft(), created_at).expect("create");
        assert_eq!(created.created_at.nanosecond(), 123_000_000);

        let later = created_at + Duration::microseconds(2_500);
        let updated = store
            .update_at(&created.id, TaskPatch::status(Status::Completed), later)
            .expect("update")
            .expect("found");
        assert_eq!(updated.updated_at.nanosecond(), 125_000_000);

        let reloaded =
            TaskStore::load(storage.clone(), Arc::new(RecordingNotifier::new())).expect("reload");
        assert_eq!(reloaded.tasks(), store.tasks());
    }

    #[test]
    fn corrupt_slots_are_set_aside_and_reseeded() {
        let storage = Arc::new(MemorySlotStorage::new());
        storage.set(TASKS_SLOT, "{not json").expect("set tasks");
        storage.set(CATEGORIES_SLOT, "[").expect("set categories");

        let store =
            TaskStore::load(storage.clone(), Arc::new(RecordingNotifier::new())).expect("load");
        assert_eq!(store.tasks().len(), 4);
        assert_eq!(store.categories().len(), 3);

        let tasks: Vec<Task> = load_slot(storage.as_ref(), TASKS_SLOT)
            .into_option()
            .expect("tasks rewritten");
        assert_eq!(tasks, store.tasks());
        let categories: Vec<Category> = load_slot(storage.as_ref(), CATEGORIES_SLOT)
            .into_option()
            .expect("categories rewritten");
        assert_eq!(categories, store.categories());

        assert_eq!(
            storage.get(&quarantine_name(TASKS_SLOT)).expect("get").as_deref(),
            Some("{not json")
        );
        assert_eq!(
            storage.get(&quarantine_name(CATEGORIES_SLOT)).expect("get").as_deref(),
            Some("[")
        );
    }

    #[test]
    fn unmovable_corrupt_snapshot_is_not_overwritten() {
        let inner = MemorySlotStorage::new();
        inner.set(TASKS_SLOT, "{not json").expect("set");

        let result = TaskStore::load(
            Arc::new(FailingWrites(inner)),
            Arc::new(RecordingNotifier::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn filter_goes_through_the_store() {
        let (store, _, _) = store();
        let done = store.filter(&TaskFilters {
            status: StatusFilter::Only(Status::Completed),
            ..TaskFilters::default()
        });
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, "4");
    }

    struct FailingWrites(MemorySlotStorage);

    impl SlotStorage for FailingWrites {
        fn get(&self, slot: &str) -> anyhow::Result<Option<String>> {
            self.0.get(slot)
        }

        fn set(&self, _slot: &str, _value: &str) -> anyhow::Result<()> {
            Err(anyhow!("disk full"))
        }

        fn remove(&self, slot: &str) -> anyhow::Result<()> {
            self.0.remove(slot)
        }

        fn quarantine(&self, _slot: &str) -> anyhow::Result<()> {
            Err(anyhow!("read-only"))
        }
    }

    #[test]
    fn failed_write_leaves_memory_unchanged() {
        let inner = MemorySlotStorage::new();
        let (seeded, _, _) = store();
        crate::datastore::save_slot(&inner, TASKS_SLOT, seeded.tasks()).expect("seed tasks");
        crate::datastore::save_slot(&inner, CATEGORIES_SLOT, seeded.categories())
            .expect("seed categories");

        let mut store = TaskStore::load(
            Arc::new(FailingWrites(inner)),
            Arc::new(RecordingNotifier::new()),
        )
        .expect("load");

        assert!(store.create(draft()).is_err());
        assert!(store.delete("1").is_err());
        assert_eq!(store.tasks().len(), 4);
        assert!(store.get_by_id("1").is_some());
    }
}

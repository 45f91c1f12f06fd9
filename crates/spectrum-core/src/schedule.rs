//! Trainings: manual creation and edits, coach availability, and expansion
//! of week templates into dated trainings

use chrono::{Days, NaiveDate, NaiveTime};
use serde::Serialize;
use spectrum_api::{NewTraining, Training, TrainingUpdate, TrainingView, WeekTemplate};
use spectrum_store::{AuditEvent, AuditEventType, Store, StoreError};
use spectrum_util::{
    CoachId, GroupId, TrainingId, UserId, date_for_day_of_week, monday_on_or_after,
    parse_template_time,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{CoreError, CoreResult};

/// Counts from one template expansion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub created: u32,
    /// (template, week) pairs whose slot already had a training
    pub skipped_existing: u32,
    /// (template, week) pairs dropped because the template could not be used
    pub skipped_invalid: u32,
}

/// Whether `[start, end)` collides with an existing `[existing_start, existing_end)`
pub fn overlaps(
    existing_start: NaiveTime,
    existing_end: NaiveTime,
    start: NaiveTime,
    end: NaiveTime,
) -> bool {
    (existing_start <= start && existing_end > start)
        || (existing_start < end && existing_end >= end)
        || (existing_start >= start && existing_end <= end)
}

/// Attach group names to trainings
pub fn training_views(store: &dyn Store, trainings: Vec<Training>) -> CoreResult<Vec<TrainingView>> {
    if trainings.is_empty() {
        return Ok(Vec::new());
    }

    let names: HashMap<GroupId, String> = store
        .list_groups()?
        .into_iter()
        .map(|g| (g.id, g.name))
        .collect();

    Ok(trainings
        .into_iter()
        .map(|training| TrainingView {
            group_name: names.get(&training.group_id).cloned().unwrap_or_default(),
            training,
        })
        .collect())
}

/// A template whose day and times resolved
struct PreparedTemplate<'a> {
    template: &'a WeekTemplate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    description: String,
}

pub struct ScheduleService {
    store: Arc<dyn Store>,
    max_weeks: u32,
}

impl ScheduleService {
    pub fn new(store: Arc<dyn Store>, max_weeks: u32) -> Self {
        Self { store, max_weeks }
    }

    pub fn max_weeks(&self) -> u32 {
        self.max_weeks
    }

    pub fn get_training(&self, id: TrainingId) -> CoreResult<TrainingView> {
        let training = self
            .store
            .get_training(id)?
            .ok_or_else(|| CoreError::NotFound(format!("training {}", id)))?;
        self.view(training)
    }

    pub fn view(&self, training: Training) -> CoreResult<TrainingView> {
        let group_name = self
            .store
            .get_group(training.group_id)?
            .map(|g| g.name)
            .unwrap_or_default();
        Ok(TrainingView {
            training,
            group_name,
        })
    }

    /// All trainings dated within `from..=to`
    pub fn schedule(&self, from: NaiveDate, to: NaiveDate) -> CoreResult<Vec<TrainingView>> {
        training_views(self.store.as_ref(), self.store.list_trainings(from, to)?)
    }

    pub fn coach_schedule(
        &self,
        coach_id: CoachId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> CoreResult<Vec<TrainingView>> {
        training_views(
            self.store.as_ref(),
            self.store.list_coach_trainings(coach_id, from, to)?,
        )
    }

    /// False if any of the coach's trainings that day overlaps `[start, end)`
    pub fn is_coach_available(
        &self,
        coach_id: CoachId,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        excluding: Option<TrainingId>,
    ) -> CoreResult<bool> {
        let busy = self
            .store
            .list_coach_trainings(coach_id, date, date)?
            .into_iter()
            .filter(|t| Some(t.id) != excluding)
            .any(|t| overlaps(t.start_time, t.end_time, start, end));
        Ok(!busy)
    }

    /// Create a one-off training after checking the coach is free
    pub fn create_training(&self, training: &NewTraining) -> CoreResult<Training> {
        if training.end_time <= training.start_time {
            return Err(CoreError::Validation(
                "end time must be after start time".into(),
            ));
        }
        if let Some(coach_id) = training.coach_id
            && !self.is_coach_available(
                coach_id,
                training.date,
                training.start_time,
                training.end_time,
                None,
            )?
        {
            return Err(CoreError::CoachUnavailable);
        }

        let created = self
            .store
            .create_training(training)
            .map_err(|e| match e {
                StoreError::Conflict(_) => CoreError::SlotAlreadyExists {
                    group_id: training.group_id,
                    date: training.date,
                    start_time: training.start_time,
                },
                other => other.into(),
            })?;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::TrainingCreated {
                training_id: created.id,
                group_id: created.group_id,
                coach_id: created.coach_id,
            }));
        info!(
            training_id = %created.id,
            group_id = %created.group_id,
            date = %created.date,
            start = %created.start_time,
            "Training created"
        );

        Ok(created)
    }

    /// Apply a partial update. Time and date changes are checked against the
    /// coach's other trainings.
    pub fn update_training(&self, id: TrainingId, update: &TrainingUpdate) -> CoreResult<Training> {
        update.validate()?;

        let current = self
            .store
            .get_training(id)?
            .ok_or_else(|| CoreError::NotFound(format!("training {}", id)))?;

        let coach_id = update.coach_id.unwrap_or(current.coach_id);
        let date = update.date.unwrap_or(current.date);
        let start = update.start_time.unwrap_or(current.start_time);
        let end = update.end_time.unwrap_or(current.end_time);
        if end <= start {
            return Err(CoreError::Validation(
                "end time must be after start time".into(),
            ));
        }

        let moves_slot = update.coach_id.is_some()
            || update.date.is_some()
            || update.start_time.is_some()
            || update.end_time.is_some();
        if moves_slot
            && let Some(coach_id) = coach_id
            && !self.is_coach_available(coach_id, date, start, end, Some(id))?
        {
            return Err(CoreError::CoachUnavailable);
        }

        let updated = self.store.update_training(id, update).map_err(|e| match e {
            StoreError::NotFound(what) => CoreError::NotFound(what),
            StoreError::Conflict(_) => CoreError::SlotAlreadyExists {
                group_id: update.group_id.unwrap_or(current.group_id),
                date,
                start_time: start,
            },
            other => other.into(),
        })?;

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::TrainingUpdated { training_id: id }));
        info!(training_id = %id, "Training updated");

        Ok(updated)
    }

    pub fn delete_training(&self, id: TrainingId) -> CoreResult<()> {
        if !self.store.delete_training(id)? {
            return Err(CoreError::NotFound(format!("training {}", id)));
        }

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::TrainingDeleted { training_id: id }));
        info!(training_id = %id, "Training deleted");

        Ok(())
    }

    /// Expand every active template over `weeks_count` weeks starting at the
    /// first Monday on or after `week_start`. Slots that already hold a
    /// training and templates that cannot be used are skipped, so running
    /// the same expansion twice creates nothing the second time.
    pub fn generate_from_templates(
        &self,
        week_start: NaiveDate,
        coach_id: Option<CoachId>,
        created_by: Option<UserId>,
        weeks_count: u32,
    ) -> CoreResult<GenerationReport> {
        if weeks_count == 0 || weeks_count > self.max_weeks {
            return Err(CoreError::Validation(format!(
                "weeks count must be between 1 and {}, got {}",
                self.max_weeks, weeks_count
            )));
        }

        let first_day = monday_on_or_after(week_start);
        let last_day = first_day + Days::new(u64::from(weeks_count) * 7 - 1);
        let mut report = GenerationReport {
            first_day,
            last_day,
            created: 0,
            skipped_existing: 0,
            skipped_invalid: 0,
        };

        let templates = self.store.list_active_templates()?;
        if templates.is_empty() {
            info!(first_day = %first_day, "No active templates to expand");
            return Ok(report);
        }

        let group_names: HashMap<GroupId, String> = self
            .store
            .list_groups()?
            .into_iter()
            .map(|g| (g.id, g.name))
            .collect();

        let mut prepared = Vec::with_capacity(templates.len());
        for template in &templates {
            match prepare_template(template, &group_names) {
                Ok(p) => prepared.push(p),
                Err(e) => {
                    warn!(template_id = %template.id, error = %e, "Skipping template");
                    let _ = self
                        .store
                        .append_audit(AuditEvent::new(AuditEventType::TemplateSkipped {
                            template_id: template.id,
                            reason: e.to_string(),
                        }));
                    report.skipped_invalid += weeks_count;
                }
            }
        }

        for week in 0..weeks_count {
            let monday = first_day + Days::new(u64::from(week) * 7);

            for p in &prepared {
                let Some(date) = date_for_day_of_week(monday, p.template.day_of_week) else {
                    continue;
                };

                let training = NewTraining {
                    group_id: p.template.group_id,
                    coach_id,
                    date,
                    start_time: p.start_time,
                    end_time: p.end_time,
                    description: p.description.clone(),
                    max_participants: None,
                    created_by,
                };

                match self.store.insert_training_if_absent(&training)? {
                    Some(created) => {
                        debug!(
                            training_id = %created.id,
                            template_id = %p.template.id,
                            date = %date,
                            "Training generated"
                        );
                        report.created += 1;
                    }
                    None => {
                        debug!(
                            template_id = %p.template.id,
                            date = %date,
                            "Slot already exists, skipping"
                        );
                        report.skipped_existing += 1;
                    }
                }
            }
        }

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ScheduleGenerated {
                first_day,
                weeks: weeks_count,
                created: report.created,
                skipped_existing: report.skipped_existing,
                skipped_invalid: report.skipped_invalid,
            }));
        info!(
            first_day = %first_day,
            weeks = weeks_count,
            created = report.created,
            skipped_existing = report.skipped_existing,
            skipped_invalid = report.skipped_invalid,
            "Schedule generated from templates"
        );

        Ok(report)
    }
}

fn prepare_template<'a>(
    template: &'a WeekTemplate,
    group_names: &HashMap<GroupId, String>,
) -> CoreResult<PreparedTemplate<'a>> {
    let parse_error = |value: &str| CoreError::TemplateParse {
        template_id: template.id,
        value: value.to_string(),
    };

    if !(1..=7).contains(&template.day_of_week) {
        return Err(parse_error(&format!("day {}", template.day_of_week)));
    }
    let start_time =
        parse_template_time(&template.start_time).ok_or_else(|| parse_error(&template.start_time))?;
    let end_time =
        parse_template_time(&template.end_time).ok_or_else(|| parse_error(&template.end_time))?;
    if end_time <= start_time {
        return Err(parse_error(&format!(
            "{}-{}",
            template.start_time, template.end_time
        )));
    }

    let description = match group_names.get(&template.group_id) {
        Some(group) => format!("{} - {}", template.description, group),
        None => template.description.clone(),
    };

    Ok(PreparedTemplate {
        template,
        start_time,
        end_time,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn service(store: &Arc<SqliteStore>) -> ScheduleService {
        ScheduleService::new(store.clone(), 12)
    }

    #[test]
    fn test_overlap_cases() {
        let existing = (time(13, 30), time(14, 30));
        let check = |s, e| overlaps(existing.0, existing.1, s, e);

        assert!(check(time(14, 0), time(15, 0)));
        assert!(check(time(13, 0), time(14, 0)));
        assert!(check(time(13, 0), time(15, 0)));
        assert!(check(time(13, 45), time(14, 15)));
        assert!(!check(time(15, 0), time(16, 0)));
        assert!(!check(time(14, 30), time(15, 30)));
        assert!(!check(time(12, 30), time(13, 30)));
    }

    #[test]
    fn test_coach_availability() {
        let store = store();
        let schedule = service(&store);
        let juniors = group(&store, "Юниоры");
        let ivan = coach(&store, 100, "Иван");
        let day = date(2025, 12, 10);
        let busy = training(&store, juniors.id, day, (13, 30), (14, 30), Some(ivan.id));

        assert!(!schedule
            .is_coach_available(ivan.id, day, time(14, 0), time(15, 0), None)
            .unwrap());
        assert!(schedule
            .is_coach_available(ivan.id, day, time(15, 0), time(16, 0), None)
            .unwrap());
        assert!(schedule
            .is_coach_available(ivan.id, day, time(14, 0), time(15, 0), Some(busy.id))
            .unwrap());
        assert!(schedule
            .is_coach_available(ivan.id, date(2025, 12, 11), time(14, 0), time(15, 0), None)
            .unwrap());
    }

    #[test]
    fn test_create_training_checks_coach_and_slot() {
        let store = store();
        let schedule = service(&store);
        let juniors = group(&store, "Юниоры");
        let adults = group(&store, "Взрослые");
        let ivan = coach(&store, 100, "Иван");
        let day = date(2025, 12, 10);

        let new = |group_id, start: u32| NewTraining {
            group_id,
            coach_id: Some(ivan.id),
            date: day,
            start_time: time(start, 0),
            end_time: time(start + 1, 0),
            description: "Зал".into(),
            max_participants: None,
            created_by: None,
        };

        schedule.create_training(&new(juniors.id, 18)).unwrap();
        assert!(matches!(
            schedule.create_training(&new(adults.id, 18)),
            Err(CoreError::CoachUnavailable)
        ));

        let mut same_slot = new(juniors.id, 18);
        same_slot.coach_id = None;
        assert!(matches!(
            schedule.create_training(&same_slot),
            Err(CoreError::SlotAlreadyExists { .. })
        ));

        schedule.create_training(&new(adults.id, 19)).unwrap();
        assert_eq!(schedule.schedule(day, day).unwrap().len(), 2);
    }

    #[test]
    fn test_update_training_time_checks_coach() {
        let store = store();
        let schedule = service(&store);
        let juniors = group(&store, "Юниоры");
        let ivan = coach(&store, 100, "Иван");
        let day = date(2025, 12, 10);
        let early = training(&store, juniors.id, day, (10, 0), (11, 0), Some(ivan.id));
        training(&store, juniors.id, day, (12, 0), (13, 0), Some(ivan.id));

        let moved = schedule
            .update_training(early.id, &TrainingUpdate::times(time(10, 30), time(11, 30)))
            .unwrap();
        assert_eq!(moved.start_time, time(10, 30));

        assert!(matches!(
            schedule.update_training(early.id, &TrainingUpdate::times(time(12, 30), time(13, 30))),
            Err(CoreError::CoachUnavailable)
        ));
        assert!(matches!(
            schedule.update_training(early.id, &TrainingUpdate::default()),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            schedule.update_training(TrainingId::new(999), &TrainingUpdate::description("Улица")),
            Err(CoreError::NotFound(_))
        ));

        let renamed = schedule
            .update_training(early.id, &TrainingUpdate::description("Улица"))
            .unwrap();
        assert_eq!(renamed.description, "Улица");
    }

    #[test]
    fn test_delete_training() {
        let store = store();
        let schedule = service(&store);
        let juniors = group(&store, "Юниоры");
        let t = training(&store, juniors.id, date(2025, 12, 10), (10, 0), (11, 0), None);

        schedule.delete_training(t.id).unwrap();
        assert!(matches!(
            schedule.delete_training(t.id),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_generate_two_templates_two_weeks() {
        let store = store();
        let schedule = service(&store);
        let a = group(&store, "A");
        let b = group(&store, "B");
        template(&store, a.id, 1, "10:00", "11:00", "Зал");
        template(&store, b.id, 3, "18:00:00", "19:00:00", "Улица");
        let monday = date(2025, 12, 8);

        let report = schedule.generate_from_templates(monday, None, None, 2).unwrap();
        assert_eq!(report.created, 4);
        assert_eq!(report.first_day, monday);
        assert_eq!(report.last_day, date(2025, 12, 21));

        let generated = schedule.schedule(monday, report.last_day).unwrap();
        let dates: Vec<_> = generated.iter().map(|v| v.training.date).collect();
        assert_eq!(
            dates,
            vec![
                date(2025, 12, 8),
                date(2025, 12, 10),
                date(2025, 12, 15),
                date(2025, 12, 17)
            ]
        );
        assert_eq!(generated[0].training.description, "Зал - A");
        assert_eq!(generated[1].training.start_time, time(18, 0));
    }

    #[test]
    fn test_generate_is_idempotent() {
        let store = store();
        let schedule = service(&store);
        let a = group(&store, "A");
        template(&store, a.id, 2, "10:00", "11:00", "Зал");
        let start = date(2025, 12, 10);

        let first = schedule.generate_from_templates(start, None, None, 3).unwrap();
        assert_eq!(first.created, 3);
        assert_eq!(first.first_day, date(2025, 12, 15));

        let second = schedule.generate_from_templates(start, None, None, 3).unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped_existing, 3);
        assert_eq!(store.list_trainings(start, second.last_day).unwrap().len(), 3);
    }

    #[test]
    fn test_generate_skips_broken_templates() {
        let store = store();
        let schedule = service(&store);
        let a = group(&store, "A");
        template(&store, a.id, 1, "10:00", "11:00", "Зал");
        template(&store, a.id, 4, "вечер", "21:00", "Зал");
        template(&store, a.id, 5, "12:00", "11:00", "Зал");

        let report = schedule
            .generate_from_templates(date(2025, 12, 8), None, None, 2)
            .unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.skipped_invalid, 4);
    }

    #[test]
    fn test_generate_without_templates_or_bad_weeks() {
        let store = store();
        let schedule = service(&store);
        let monday = date(2025, 12, 8);

        let report = schedule.generate_from_templates(monday, None, None, 1).unwrap();
        assert_eq!(report.created, 0);

        assert!(matches!(
            schedule.generate_from_templates(monday, None, None, 0),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            schedule.generate_from_templates(monday, None, None, 13),
            Err(CoreError::Validation(_))
        ));
    }
}

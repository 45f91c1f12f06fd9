//! Coach flows over trainings: manual creation, edits, template expansion
//! and the schedule view

use chrono::{Days, Duration, NaiveDate, NaiveTime};
use spectrum_api::{
    Failure, Group, InputProblem, NewTraining, Outcome, Prompt, Reply, TrainingUpdate,
    TrainingView, labels,
};
use spectrum_util::{CoachId, UserId, next_monday};

use super::flow::{Transition, input};
use super::input::{
    choose, day_options, duration_label, is_confirm, parse_day, parse_duration, parse_new_times,
    parse_period, parse_start_time, parse_upcoming_day, parse_weeks, period_options, pick,
    weeks_label,
};
use super::Ctx;
use crate::CoreResult;

#[derive(Debug, Clone)]
pub struct AddTraining {
    coach_id: CoachId,
    user_id: UserId,
    step: AddTrainingStep,
}

#[derive(Debug, Clone)]
enum AddTrainingStep {
    Group {
        groups: Vec<Group>,
    },
    Date {
        group: Group,
    },
    StartTime {
        group: Group,
        date: NaiveDate,
    },
    Duration {
        group: Group,
        date: NaiveDate,
        start: NaiveTime,
        options: Vec<u32>,
    },
    Confirm {
        group: Group,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    },
}

impl AddTraining {
    pub(crate) fn start(ctx: &Ctx<'_>, coach_id: CoachId, user_id: UserId) -> CoreResult<Transition> {
        let groups = ctx.store.list_groups()?;
        if groups.is_empty() {
            return Ok(Transition::finish(Reply::failed(Failure::NoGroups)));
        }
        Ok(Transition::next(Self {
            coach_id,
            user_id,
            step: AddTrainingStep::Group { groups },
        }))
    }

    pub(crate) fn prompt(&self) -> Prompt {
        match &self.step {
            AddTrainingStep::Group { groups } => Prompt::ChooseGroup {
                groups: groups.clone(),
            },
            AddTrainingStep::Date { .. } => Prompt::ChooseDate {
                options: day_options(),
            },
            AddTrainingStep::StartTime { date, .. } => Prompt::ChooseStartTime { date: *date },
            AddTrainingStep::Duration { options, .. } => Prompt::ChooseDuration {
                options: options.iter().map(|&m| duration_label(m)).collect(),
            },
            AddTrainingStep::Confirm {
                group,
                date,
                start,
                end,
            } => Prompt::ConfirmTraining {
                group: group.clone(),
                date: *date,
                start_time: *start,
                end_time: *end,
            },
        }
    }

    pub(crate) fn advance(self, text: &str, ctx: &Ctx<'_>) -> CoreResult<Transition> {
        let step = match &self.step {
            AddTrainingStep::Group { groups } => {
                let group = input!(self, choose(groups, text, |g| g.name.as_str())).clone();
                AddTrainingStep::Date { group }
            }
            AddTrainingStep::Date { group } => {
                let date = input!(self, parse_upcoming_day(text, ctx.now));
                AddTrainingStep::StartTime {
                    group: group.clone(),
                    date,
                }
            }
            AddTrainingStep::StartTime { group, date } => {
                let start = input!(self, parse_start_time(text, *date, ctx.now));
                AddTrainingStep::Duration {
                    group: group.clone(),
                    date: *date,
                    start,
                    options: ctx.config.scheduling.duration_minutes.clone(),
                }
            }
            AddTrainingStep::Duration {
                group,
                date,
                start,
                options,
            } => {
                let minutes = input!(self, parse_duration(text, options));
                let (end, wrapped) =
                    start.overflowing_add_signed(Duration::minutes(i64::from(minutes)));
                if wrapped != 0 || end <= *start {
                    return Ok(Transition::retry(self, InputProblem::EndNotAfterStart));
                }
                AddTrainingStep::Confirm {
                    group: group.clone(),
                    date: *date,
                    start: *start,
                    end,
                }
            }
            AddTrainingStep::Confirm {
                group,
                date,
                start,
                end,
            } => {
                if !is_confirm(text, labels::CONFIRM_CREATE_TRAINING) {
                    return Ok(Transition::retry(self, InputProblem::UnknownOption));
                }
                let training = NewTraining {
                    group_id: group.id,
                    coach_id: Some(self.coach_id),
                    date: *date,
                    start_time: *start,
                    end_time: *end,
                    description: String::new(),
                    max_participants: None,
                    created_by: Some(self.user_id),
                };
                let created = ctx.schedule.create_training(&training)?;
                let training = ctx.schedule.view(created)?;
                return Ok(Transition::finish(Reply::done(Outcome::TrainingCreated {
                    training,
                })));
            }
        };
        Ok(Transition::next(Self { step, ..self }))
    }
}

#[derive(Debug, Clone)]
pub struct EditTraining {
    coach_id: CoachId,
    step: EditTrainingStep,
}

#[derive(Debug, Clone)]
enum EditTrainingStep {
    Date,
    Training {
        date: NaiveDate,
        trainings: Vec<TrainingView>,
    },
    Action {
        training: TrainingView,
    },
    Times {
        training: TrainingView,
    },
    Description {
        training: TrainingView,
    },
    ConfirmDelete {
        training: TrainingView,
    },
}

fn training_actions() -> Vec<String> {
    [
        labels::CHANGE_TIME,
        labels::CHANGE_PLACE,
        labels::DELETE_TRAINING,
    ]
    .map(String::from)
    .to_vec()
}

impl EditTraining {
    pub(crate) fn start(coach_id: CoachId) -> CoreResult<Transition> {
        Ok(Transition::next(Self {
            coach_id,
            step: EditTrainingStep::Date,
        }))
    }

    pub(crate) fn prompt(&self) -> Prompt {
        match &self.step {
            EditTrainingStep::Date => Prompt::ChooseDate {
                options: day_options(),
            },
            EditTrainingStep::Training { date, trainings } => Prompt::ChooseTraining {
                date: *date,
                trainings: trainings.clone(),
            },
            EditTrainingStep::Action { training } => Prompt::ChooseTrainingAction {
                training: training.clone(),
                actions: training_actions(),
            },
            EditTrainingStep::Times { training } => Prompt::EnterTimeRange {
                training: training.clone(),
            },
            EditTrainingStep::Description { training } => Prompt::EnterDescription {
                training: training.clone(),
            },
            EditTrainingStep::ConfirmDelete { training } => Prompt::ConfirmTrainingDeletion {
                training: training.clone(),
            },
        }
    }

    pub(crate) fn advance(self, text: &str, ctx: &Ctx<'_>) -> CoreResult<Transition> {
        let step = match &self.step {
            EditTrainingStep::Date => {
                let date = input!(self, parse_day(text, ctx.today()));
                let trainings = ctx.schedule.coach_schedule(self.coach_id, date, date)?;
                if trainings.is_empty() {
                    return Ok(Transition::retry(
                        self,
                        InputProblem::NoTrainingsOnDate { date },
                    ));
                }
                EditTrainingStep::Training { date, trainings }
            }
            EditTrainingStep::Training { trainings, .. } => EditTrainingStep::Action {
                training: input!(self, pick(trainings, text)).clone(),
            },
            EditTrainingStep::Action { training } => {
                let training = training.clone();
                match text {
                    labels::CHANGE_TIME => EditTrainingStep::Times { training },
                    labels::CHANGE_PLACE => EditTrainingStep::Description { training },
                    labels::DELETE_TRAINING => EditTrainingStep::ConfirmDelete { training },
                    _ => return Ok(Transition::retry(self, InputProblem::UnknownOption)),
                }
            }
            EditTrainingStep::Times { training } => {
                let current = &training.training;
                let (start, end) = input!(
                    self,
                    parse_new_times(text, current.start_time, current.end_time)
                );
                let updated = ctx
                    .schedule
                    .update_training(current.id, &TrainingUpdate::times(start, end))?;
                return finish_update(ctx, updated);
            }
            EditTrainingStep::Description { training } => {
                let description = text.trim();
                if description.is_empty() {
                    return Ok(Transition::retry(self, InputProblem::EmptyText));
                }
                let updated = ctx.schedule.update_training(
                    training.training.id,
                    &TrainingUpdate::description(description),
                )?;
                return finish_update(ctx, updated);
            }
            EditTrainingStep::ConfirmDelete { training } => {
                if !is_confirm(text, labels::CONFIRM_DELETE) {
                    return Ok(Transition::retry(self, InputProblem::UnknownOption));
                }
                let training_id = training.training.id;
                ctx.schedule.delete_training(training_id)?;
                return Ok(Transition::finish(Reply::done(Outcome::TrainingDeleted {
                    training_id,
                })));
            }
        };
        Ok(Transition::next(Self { step, ..self }))
    }
}

fn finish_update(ctx: &Ctx<'_>, updated: spectrum_api::Training) -> CoreResult<Transition> {
    let training = ctx.schedule.view(updated)?;
    Ok(Transition::finish(Reply::done(Outcome::TrainingUpdated {
        training,
    })))
}

#[derive(Debug, Clone)]
pub struct CreateFromTemplates {
    coach_id: CoachId,
    user_id: UserId,
    step: TemplatesStep,
}

#[derive(Debug, Clone)]
enum TemplatesStep {
    Weeks { options: Vec<u32>, max_weeks: u32 },
    Confirm { first_day: NaiveDate, weeks: u32 },
}

impl CreateFromTemplates {
    pub(crate) fn start(ctx: &Ctx<'_>, coach_id: CoachId, user_id: UserId) -> CoreResult<Transition> {
        Ok(Transition::next(Self {
            coach_id,
            user_id,
            step: TemplatesStep::Weeks {
                options: ctx.config.scheduling.week_options.clone(),
                max_weeks: ctx.schedule.max_weeks(),
            },
        }))
    }

    pub(crate) fn prompt(&self) -> Prompt {
        match &self.step {
            TemplatesStep::Weeks { options, max_weeks } => Prompt::ChooseWeeksCount {
                options: options.iter().map(|&w| weeks_label(w)).collect(),
                max_weeks: *max_weeks,
            },
            TemplatesStep::Confirm { first_day, weeks } => Prompt::ConfirmSchedule {
                first_day: *first_day,
                last_day: last_day(*first_day, *weeks),
                weeks: *weeks,
            },
        }
    }

    pub(crate) fn advance(self, text: &str, ctx: &Ctx<'_>) -> CoreResult<Transition> {
        let step = match &self.step {
            TemplatesStep::Weeks { options, max_weeks } => TemplatesStep::Confirm {
                first_day: next_monday(ctx.today()),
                weeks: input!(self, parse_weeks(text, options, *max_weeks)),
            },
            TemplatesStep::Confirm { first_day, weeks } => {
                if !is_confirm(text, labels::CONFIRM_CREATE_SCHEDULE) {
                    return Ok(Transition::retry(self, InputProblem::UnknownOption));
                }
                let report = ctx.schedule.generate_from_templates(
                    *first_day,
                    Some(self.coach_id),
                    Some(self.user_id),
                    *weeks,
                )?;
                return Ok(Transition::finish(Reply::done(Outcome::ScheduleGenerated {
                    created: report.created,
                    first_day: report.first_day,
                    last_day: report.last_day,
                })));
            }
        };
        Ok(Transition::next(Self { step, ..self }))
    }
}

fn last_day(first_day: NaiveDate, weeks: u32) -> NaiveDate {
    first_day + Days::new(u64::from(weeks) * 7 - 1)
}

/// Trainings of every group over a chosen period
#[derive(Debug, Clone)]
pub struct ViewSchedule;

impl ViewSchedule {
    pub(crate) fn start() -> CoreResult<Transition> {
        Ok(Transition::next(Self))
    }

    pub(crate) fn prompt(&self) -> Prompt {
        Prompt::ChoosePeriod {
            options: period_options(),
        }
    }

    pub(crate) fn advance(self, text: &str, ctx: &Ctx<'_>) -> CoreResult<Transition> {
        let (from, to) = input!(self, parse_period(text, ctx.today()));
        let trainings = ctx.schedule.schedule(from, to)?;
        Ok(Transition::finish(Reply::done(Outcome::Schedule {
            from,
            to,
            trainings,
        })))
    }
}

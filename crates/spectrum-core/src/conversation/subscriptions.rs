//! Coach flows that issue and remove subscriptions

use spectrum_api::{
    Failure, InputProblem, Outcome, Prompt, Reply, Student, Subscription, SubscriptionPlan,
    labels,
};

use super::flow::{Transition, input};
use super::input::{choose, is_confirm, pick};
use super::Ctx;
use crate::CoreResult;

fn choose_student<'a>(students: &'a [Student], text: &str) -> Result<&'a Student, InputProblem> {
    choose(students, text, |s| s.name.as_str())
}

fn students_or_failure(ctx: &Ctx<'_>) -> CoreResult<Result<Vec<Student>, Transition>> {
    let students = ctx.store.list_students()?;
    if students.is_empty() {
        return Ok(Err(Transition::finish(Reply::failed(Failure::NoStudents))));
    }
    Ok(Ok(students))
}

#[derive(Debug, Clone)]
pub struct AddSubscription {
    step: AddStep,
}

#[derive(Debug, Clone)]
enum AddStep {
    Student {
        students: Vec<Student>,
    },
    Plan {
        student: Student,
        plans: Vec<SubscriptionPlan>,
    },
    Confirm {
        student: Student,
        plan: SubscriptionPlan,
    },
}

impl AddSubscription {
    pub(crate) fn start(ctx: &Ctx<'_>) -> CoreResult<Transition> {
        Ok(match students_or_failure(ctx)? {
            Ok(students) => Transition::next(Self {
                step: AddStep::Student { students },
            }),
            Err(done) => done,
        })
    }

    pub(crate) fn prompt(&self) -> Prompt {
        match &self.step {
            AddStep::Student { students } => Prompt::ChooseStudent {
                students: students.clone(),
            },
            AddStep::Plan { student, plans } => Prompt::ChoosePlan {
                student: student.clone(),
                plans: plans.clone(),
            },
            AddStep::Confirm { student, plan } => Prompt::ConfirmSubscription {
                student: student.clone(),
                plan: plan.clone(),
            },
        }
    }

    pub(crate) fn advance(self, text: &str, ctx: &Ctx<'_>) -> CoreResult<Transition> {
        let step = match &self.step {
            AddStep::Student { students } => AddStep::Plan {
                student: input!(self, choose_student(students, text)).clone(),
                plans: ctx.config.plans.clone(),
            },
            AddStep::Plan { student, plans } => AddStep::Confirm {
                student: student.clone(),
                plan: input!(self, choose(plans, text, |p| p.label.as_str())).clone(),
            },
            AddStep::Confirm { student, plan } => {
                if !is_confirm(text, labels::CONFIRM) {
                    return Ok(Transition::retry(self, InputProblem::UnknownOption));
                }
                let subscription = ctx.booking.ledger().issue(student.id, plan, ctx.now)?;
                return Ok(Transition::finish(Reply::done(Outcome::SubscriptionIssued {
                    student: student.clone(),
                    subscription,
                })));
            }
        };
        Ok(Transition::next(Self { step }))
    }
}

#[derive(Debug, Clone)]
pub struct DeleteSubscription {
    step: DeleteStep,
}

#[derive(Debug, Clone)]
enum DeleteStep {
    Student {
        students: Vec<Student>,
    },
    Subscription {
        student: Student,
        subscriptions: Vec<Subscription>,
    },
    Confirm {
        student: Student,
        subscription: Subscription,
    },
}

impl DeleteSubscription {
    pub(crate) fn start(ctx: &Ctx<'_>) -> CoreResult<Transition> {
        Ok(match students_or_failure(ctx)? {
            Ok(students) => Transition::next(Self {
                step: DeleteStep::Student { students },
            }),
            Err(done) => done,
        })
    }

    pub(crate) fn prompt(&self) -> Prompt {
        match &self.step {
            DeleteStep::Student { students } => Prompt::ChooseStudent {
                students: students.clone(),
            },
            DeleteStep::Subscription {
                student,
                subscriptions,
            } => Prompt::ChooseSubscription {
                student: student.clone(),
                subscriptions: subscriptions.clone(),
            },
            DeleteStep::Confirm {
                student,
                subscription,
            } => Prompt::ConfirmSubscriptionDeletion {
                student: student.clone(),
                subscription: subscription.clone(),
            },
        }
    }

    pub(crate) fn advance(self, text: &str, ctx: &Ctx<'_>) -> CoreResult<Transition> {
        let step = match &self.step {
            DeleteStep::Student { students } => {
                let student = input!(self, choose_student(students, text)).clone();
                let subscriptions = ctx.booking.ledger().list(student.id)?;
                if subscriptions.is_empty() {
                    return Ok(Transition::finish(Reply::failed(Failure::NoSubscriptions)));
                }
                DeleteStep::Subscription {
                    student,
                    subscriptions,
                }
            }
            DeleteStep::Subscription {
                student,
                subscriptions,
            } => DeleteStep::Confirm {
                student: student.clone(),
                subscription: input!(self, pick(subscriptions, text)).clone(),
            },
            DeleteStep::Confirm { subscription, .. } => {
                if !is_confirm(text, labels::CONFIRM_DELETE_SUBSCRIPTION) {
                    return Ok(Transition::retry(self, InputProblem::UnknownOption));
                }
                let subscription_id = subscription.id;
                ctx.booking.ledger().delete(subscription_id)?;
                return Ok(Transition::finish(Reply::done(
                    Outcome::SubscriptionDeleted { subscription_id },
                )));
            }
        };
        Ok(Transition::next(Self { step }))
    }
}

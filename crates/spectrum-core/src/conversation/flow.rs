//! Flow states and transitions

use spectrum_api::{InputProblem, Prompt, Reply};

use super::{
    AddSubscription, AddTraining, CancelSignUp, Ctx, CreateFromTemplates, DeleteSubscription,
    EditTraining, MarkAttendance, SignUp, ViewSchedule,
};
use crate::CoreResult;

/// What one message did to the chat's flow
pub(crate) enum Transition {
    /// Move on; the flow waits for more input
    Next(Flow),
    /// Input rejected; the flow stays on the same step
    Retry(Flow, InputProblem),
    /// The flow is over, or never started
    Finish(Reply),
}

impl Transition {
    pub(crate) fn next(flow: impl Into<Flow>) -> Self {
        Transition::Next(flow.into())
    }

    pub(crate) fn retry(flow: impl Into<Flow>, problem: InputProblem) -> Self {
        Transition::Retry(flow.into(), problem)
    }

    pub(crate) fn finish(reply: Reply) -> Self {
        Transition::Finish(reply)
    }
}

/// Unwrap parsed input, or hand the unchanged flow back with the problem
macro_rules! input {
    ($flow:expr, $parsed:expr) => {
        match $parsed {
            Ok(value) => value,
            Err(problem) => {
                return Ok($crate::conversation::flow::Transition::retry($flow, problem));
            }
        }
    };
}
pub(crate) use input;

macro_rules! flows {
    ($($variant:ident),* $(,)?) => {
        /// The multi-step operation a chat is in. Each variant owns its
        /// current step together with what was chosen on earlier steps.
        #[derive(Debug, Clone)]
        pub enum Flow {
            $($variant($variant),)*
        }

        $(
            impl From<$variant> for Flow {
                fn from(flow: $variant) -> Self {
                    Flow::$variant(flow)
                }
            }
        )*

        impl Flow {
            pub fn name(&self) -> &'static str {
                match self {
                    $(Flow::$variant(_) => stringify!($variant),)*
                }
            }

            /// What the current step asks for, rebuilt from its own data
            pub fn prompt(&self) -> Prompt {
                match self {
                    $(Flow::$variant(flow) => flow.prompt(),)*
                }
            }

            pub(crate) fn advance(self, text: &str, ctx: &Ctx<'_>) -> CoreResult<Transition> {
                match self {
                    $(Flow::$variant(flow) => flow.advance(text, ctx),)*
                }
            }
        }
    };
}

flows!(
    AddTraining,
    EditTraining,
    CreateFromTemplates,
    ViewSchedule,
    SignUp,
    CancelSignUp,
    MarkAttendance,
    AddSubscription,
    DeleteSubscription,
);

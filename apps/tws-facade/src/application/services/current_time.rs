//! Server Time

use chrono::{DateTime, Utc};

use super::{Correlation, Operation, RequestContext, Step, api_error, execute, unexpected};
use crate::domain::events::{Event, Selector};
use crate::error::Error;

/// Waits for the single `currentTime` reply.
#[derive(Debug, Default)]
pub struct CurrentTimeCorrelation {
    time: Option<i64>,
}

impl Correlation for CurrentTimeCorrelation {
    type Output = DateTime<Utc>;
    const OPERATION: Operation = Operation::CurrentTime;

    fn selectors(&self) -> &'static [Selector] {
        &[Selector::CurrentTime, Selector::ApiError]
    }

    fn on_event(&mut self, event: Event) -> Result<Step, Error> {
        match event {
            Event::CurrentTime(reply) => {
                self.time = Some(reply.time);
                Ok(Step::Done)
            }
            Event::ApiError(error) => api_error(Self::OPERATION, None, error),
            other => Err(unexpected(Self::OPERATION, &other)),
        }
    }

    fn finish(self) -> Result<Self::Output, Error> {
        let secs = self.time.ok_or(Error::Disconnected {
            operation: Self::OPERATION.as_str(),
        })?;
        DateTime::from_timestamp(secs, 0).ok_or(Error::InvalidTimestamp(secs))
    }
}

/// Ask the platform for its clock.
///
/// # Errors
///
/// Returns an error if the request fails or the first reply is not a
/// server time.
pub fn get_current_time(ctx: RequestContext<'_>) -> Result<DateTime<Utc>, Error> {
    execute(ctx, CurrentTimeCorrelation::default(), || {
        ctx.transport.request_current_time().map_err(Error::from)
    })
}

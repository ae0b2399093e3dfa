//! Account Positions
//!
//! Portfolio lines are streamed after account updates are switched on and
//! the batch closes with `accountDownloadEnd`. The toggle is global on the
//! server, so it is switched off again on every exit path.

use super::{Correlation, Operation, RequestContext, Step, api_error, execute, unexpected};
use crate::application::ports::Transport;
use crate::domain::events::{Event, Selector};
use crate::domain::position::Position;
use crate::error::Error;

/// Collects portfolio lines until the account download ends.
#[derive(Debug, Default)]
pub struct PositionsCorrelation {
    positions: Vec<Position>,
}

impl Correlation for PositionsCorrelation {
    type Output = Vec<Position>;
    const OPERATION: Operation = Operation::Positions;

    fn selectors(&self) -> &'static [Selector] {
        &[Selector::PortfolioUpdate, Selector::AccountDownloadEnd, Selector::ApiError]
    }

    fn on_event(&mut self, event: Event) -> Result<Step, Error> {
        match event {
            Event::PortfolioUpdate(update) => {
                self.positions.push(Position::try_from(&update)?);
                Ok(Step::Continue)
            }
            Event::AccountDownloadEnd(end) => {
                tracing::debug!(
                    account = %end.account_name,
                    positions = self.positions.len(),
                    "Account download complete"
                );
                Ok(Step::Done)
            }
            Event::ApiError(error) => api_error(Self::OPERATION, None, error),
            other => Err(unexpected(Self::OPERATION, &other)),
        }
    }

    fn finish(self) -> Result<Self::Output, Error> {
        Ok(self.positions)
    }
}

/// Switches account updates off when dropped.
#[must_use = "dropping the guard immediately disables account updates"]
pub struct AccountUpdatesGuard<'a> {
    transport: &'a dyn Transport,
}

impl std::fmt::Debug for AccountUpdatesGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountUpdatesGuard").finish_non_exhaustive()
    }
}

impl<'a> AccountUpdatesGuard<'a> {
    /// Arm the guard, then switch account updates on.
    ///
    /// # Errors
    ///
    /// Returns an error if the enable request fails; the disable request is
    /// still sent.
    pub fn enable(transport: &'a dyn Transport) -> Result<Self, Error> {
        let guard = Self { transport };
        transport.request_account_updates(true, "")?;
        Ok(guard)
    }
}

impl Drop for AccountUpdatesGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.transport.request_account_updates(false, "") {
            tracing::warn!(error = %e, "Failed to disable account updates");
        }
    }
}

/// Fetch every position of every account the session can see.
///
/// # Errors
///
/// Returns an error if a request fails, an unexpected event arrives, or a
/// portfolio contract cannot be translated.
pub fn get_positions(ctx: RequestContext<'_>) -> Result<Vec<Position>, Error> {
    execute(ctx, PositionsCorrelation::default(), || {
        AccountUpdatesGuard::enable(ctx.transport)
    })
}

//! Account Positions

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::events::PortfolioUpdate;
use crate::domain::instrument::{Instrument, InstrumentError};

/// A single position held in an account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    account_name: String,
    instrument: Instrument,
    quantity: Decimal,
    price: f64,
    average_cost: f64,
    market_value: f64,
    realized_pnl: f64,
    unrealized_pnl: f64,
}

impl Position {
    /// The account holding this position.
    #[must_use]
    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// The held instrument.
    #[must_use]
    pub const fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Position size.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Current market price.
    #[must_use]
    pub const fn price(&self) -> f64 {
        self.price
    }

    /// Average cost.
    #[must_use]
    pub const fn average_cost(&self) -> f64 {
        self.average_cost
    }

    /// Market value.
    #[must_use]
    pub const fn market_value(&self) -> f64 {
        self.market_value
    }

    /// Realized P&L.
    #[must_use]
    pub const fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    /// Unrealized P&L.
    #[must_use]
    pub const fn unrealized_pnl(&self) -> f64 {
        self.unrealized_pnl
    }
}

impl TryFrom<&PortfolioUpdate> for Position {
    type Error = InstrumentError;

    fn try_from(update: &PortfolioUpdate) -> Result<Self, Self::Error> {
        Ok(Self {
            account_name: update.account_name.clone(),
            instrument: Instrument::try_from(&update.contract)?,
            quantity: update.position,
            price: update.market_price,
            average_cost: update.average_cost,
            market_value: update.market_value,
            realized_pnl: update.realized_pnl,
            unrealized_pnl: update.unrealized_pnl,
        })
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Position({}, {}, {})",
            self.account_name,
            self.instrument.ticker(),
            self.quantity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::{ContractDescriptor, SecurityType};

    fn update(contract: ContractDescriptor) -> PortfolioUpdate {
        PortfolioUpdate {
            contract,
            position: Decimal::from(200),
            market_price: 101.5,
            market_value: 20_300.0,
            average_cost: 95.25,
            unrealized_pnl: 1_250.0,
            realized_pnl: 0.0,
            account_name: "DU123456".to_string(),
        }
    }

    #[test]
    fn translates_portfolio_update() {
        let position = Position::try_from(&update(ContractDescriptor::stock("IBM"))).unwrap();

        assert_eq!(position.account_name(), "DU123456");
        assert_eq!(position.instrument().ticker(), "IBM");
        assert_eq!(position.quantity(), Decimal::from(200));
        assert_eq!(position.price(), 101.5);
        assert_eq!(position.average_cost(), 95.25);
        assert_eq!(position.market_value(), 20_300.0);
        assert_eq!(position.unrealized_pnl(), 1_250.0);
        assert_eq!(position.realized_pnl(), 0.0);
        assert_eq!(position.to_string(), "Position(DU123456, IBM, 200)");
    }

    #[test]
    fn unsupported_contract_fails_translation() {
        let contract = ContractDescriptor {
            sec_type: SecurityType::Other("BOND".to_string()),
            ..ContractDescriptor::default()
        };
        assert!(Position::try_from(&update(contract)).is_err());
    }
}

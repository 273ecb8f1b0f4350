//! Lookup of currencies and accounts loaded from configuration

use std::collections::HashMap;

use crate::core::model::{Account, AccountId, Currency, CurrencyId, ModelError};

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    currencies: Vec<Currency>,
    by_id: HashMap<CurrencyId, usize>,
    accounts: HashMap<AccountId, Account>,
}

impl Catalog {
    pub fn new(currencies: Vec<Currency>, accounts: Vec<Account>) -> Result<Self, ModelError> {
        for currency in &currencies {
            currency.validate()?;
        }
        let by_id = currencies
            .iter()
            .enumerate()
            .map(|(index, c)| (c.id, index))
            .collect();
        let accounts = accounts.into_iter().map(|a| (a.id, a)).collect();

        Ok(Self {
            currencies,
            by_id,
            accounts,
        })
    }

    pub fn currency(&self, id: CurrencyId) -> Option<&Currency> {
        self.by_id.get(&id).map(|index| &self.currencies[*index])
    }

    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    /// Label for log and table output, falling back to the raw id.
    pub fn code(&self, id: CurrencyId) -> String {
        self.currency(id)
            .map_or_else(|| id.to_string(), |c| c.code.clone())
    }

    /// Finds a currency by numeric id or by code. Codes are not unique, the
    /// first declared currency with a matching code wins.
    pub fn find(&self, key: &str) -> Option<&Currency> {
        if let Ok(id) = key.parse::<u32>() {
            return self.currency(CurrencyId(id));
        }
        self.currencies
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn currency(id: u32, code: &str, exchange: Option<u32>) -> Currency {
        Currency {
            id: CurrencyId(id),
            code: code.to_string(),
            name: format!("{code} #{id}"),
            decimal_places: 2,
            exchange_currency: exchange.map(CurrencyId),
        }
    }

    #[test]
    fn test_find_by_id_and_code() {
        let catalog = Catalog::new(
            vec![
                currency(1, "USD", None),
                currency(2, "EUR", Some(1)),
                currency(3, "EUR", Some(1)),
            ],
            vec![],
        )
        .unwrap();

        assert_eq!(catalog.find("3").unwrap().id, CurrencyId(3));
        assert_eq!(catalog.find("eur").unwrap().id, CurrencyId(2));
        assert!(catalog.find("GBP").is_none());
        assert_eq!(catalog.code(CurrencyId(1)), "USD");
        assert_eq!(catalog.code(CurrencyId(9)), "#9");
    }

    #[test]
    fn test_rejects_self_exchange() {
        let result = Catalog::new(vec![currency(1, "USD", Some(1))], vec![]);
        assert_eq!(result.unwrap_err(), ModelError::SelfExchange(CurrencyId(1)));
    }
}

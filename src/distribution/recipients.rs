//! Recipient list input

use crate::error::{DistributorError, DistributorResult};

use ethers::types::{Address, U256};
use std::path::Path;

/// One reward transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub address: Address,
    /// Amount in the chain's smallest unit
    pub amount: U256,
}

/// Read and validate a recipients CSV file
pub fn read_csv(path: &Path) -> DistributorResult<Vec<Recipient>> {
    let raw = std::fs::read_to_string(path)?;
    parse_csv(&raw)
}

/// Parse CSV text with a header row naming `address` and `amount` columns.
///
/// Blank lines are skipped. Rows are numbered from 1, counting data rows only.
/// Fields are split on every comma, so quoted commas are not supported.
pub fn parse_csv(input: &str) -> DistributorResult<Vec<Recipient>> {
    let mut lines = input.lines().filter(|line| !line.trim().is_empty());

    let header = lines
        .next()
        .ok_or_else(|| DistributorError::invalid("CSV input has no header row"))?;
    let columns: Vec<String> = split_row(header)
        .iter()
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let address_col = column_index(&columns, "address")?;
    let amount_col = column_index(&columns, "amount")?;

    let mut recipients = Vec::new();
    let mut total = U256::zero();

    for (index, line) in lines.enumerate() {
        let row = index + 1;
        let fields = split_row(line);
        let field = |col: usize, name: &str| {
            fields
                .get(col)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| DistributorError::Validation {
                    row,
                    message: format!("missing {}", name),
                })
        };

        let address_raw = field(address_col, "address")?;
        let address = address_raw
            .parse::<Address>()
            .map_err(|e| DistributorError::Validation {
                row,
                message: format!("invalid address {:?}: {}", address_raw, e),
            })?;

        let amount = parse_amount(field(amount_col, "amount")?)
            .map_err(|message| DistributorError::Validation { row, message })?;

        total = total
            .checked_add(amount)
            .ok_or_else(|| DistributorError::Validation {
                row,
                message: "total amount overflows".to_string(),
            })?;

        recipients.push(Recipient { address, amount });
    }

    Ok(recipients)
}

/// Sum of all amounts. Callers pass validated input, where this cannot overflow.
pub fn total_amount(recipients: &[Recipient]) -> U256 {
    recipients
        .iter()
        .fold(U256::zero(), |acc, r| acc.saturating_add(r.amount))
}

fn split_row(line: &str) -> Vec<String> {
    line.split(',')
        .map(|field| field.trim().trim_matches('"').trim().to_string())
        .collect()
}

fn column_index(columns: &[String], name: &str) -> DistributorResult<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .ok_or_else(|| DistributorError::invalid(format!("CSV header has no {:?} column", name)))
}

fn parse_amount(raw: &str) -> Result<U256, String> {
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("amount {:?} is not a non-negative integer", raw));
    }
    let amount = U256::from_dec_str(raw).map_err(|_| format!("amount {:?} overflows", raw))?;
    if amount.is_zero() {
        return Err("amount must be positive".to_string());
    }
    Ok(amount)
}

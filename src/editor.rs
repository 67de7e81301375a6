use std::{
    io::{BufRead, Write},
    str::FromStr,
};

use rust_decimal::Decimal;
use spendlog_core::{round_amount, ExpenseRecord, IntoExpenseDate, NewExpense, DEFAULT_CATEGORIES};

use crate::{error::AppError, expenses::ExpenseService};

pub const MIN_ROWS: usize = 5;
pub const DEFAULT_CATEGORY: &str = "Shopping";

/// The day's entry form. Holds one row per existing record, padded with blank
/// rows up to [`MIN_ROWS`].
#[derive(Debug, Clone, PartialEq)]
pub struct DayForm {
    pub rows: Vec<NewExpense>,
}

impl DayForm {
    pub fn prefill(records: &[ExpenseRecord]) -> Self {
        let mut rows: Vec<NewExpense> = records.iter().map(NewExpense::from).collect();
        while rows.len() < MIN_ROWS {
            rows.push(blank_row());
        }
        Self { rows }
    }

    /// Walks every row prompting for amount, category and notes. A blank answer
    /// keeps the current value and an invalid one asks again. Returns `false`
    /// when input ends early or the user declines to submit.
    pub fn run<R: BufRead, W: Write>(&mut self, input: &mut R, output: &mut W) -> Result<bool, AppError> {
        let categories = DEFAULT_CATEGORIES.join("/");
        let total = self.rows.len();

        for (i, row) in self.rows.iter_mut().enumerate() {
            writeln!(output, "-- Expense {} of {} --", i + 1, total)?;

            match ask(input, output, &format!("Amount [{:.2}]", row.amount), parse_amount_input)? {
                Answer::Value(amount) => row.amount = amount,
                Answer::Keep => {}
                Answer::Eof => return Ok(false),
            }
            match ask(
                input,
                output,
                &format!("Category ({}) [{}]", categories, row.category),
                parse_category_input,
            )? {
                Answer::Value(category) => row.category = category,
                Answer::Keep => {}
                Answer::Eof => return Ok(false),
            }
            match ask(input, output, &format!("Notes [{}]", row.notes), |s| {
                Ok::<_, AppError>(s.to_string())
            })? {
                Answer::Value(notes) => row.notes = notes,
                Answer::Keep => {}
                Answer::Eof => return Ok(false),
            }
        }

        write!(output, "Submit {} rows? [y/N]: ", total)?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }
        Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    pub fn submit(&self, service: &ExpenseService, date: impl IntoExpenseDate) -> Result<usize, AppError> {
        Ok(service.replace_day(date, self.rows.clone())?)
    }
}

fn blank_row() -> NewExpense {
    NewExpense::new(Decimal::ZERO, DEFAULT_CATEGORY, "")
}

enum Answer<T> {
    Value(T),
    Keep,
    Eof,
}

fn ask<R, W, T, F>(input: &mut R, output: &mut W, prompt: &str, parse: F) -> Result<Answer<T>, AppError>
where
    R: BufRead,
    W: Write,
    F: Fn(&str) -> Result<T, AppError>,
{
    loop {
        write!(output, "{}: ", prompt)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(Answer::Eof);
        }
        let line = line.trim();
        if line.is_empty() {
            return Ok(Answer::Keep);
        }
        match parse(line) {
            Ok(value) => return Ok(Answer::Value(value)),
            Err(e) => writeln!(output, "{}", e)?,
        }
    }
}

pub fn parse_amount_input(s: &str) -> Result<Decimal, AppError> {
    let s = s.trim().trim_start_matches('$');
    let amount = Decimal::from_str(s).map_err(|_| AppError::InvalidInput(format!("'{}' is not an amount", s)))?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AppError::InvalidInput("amount cannot be negative".to_string()));
    }
    Ok(round_amount(amount))
}

/// Matches `s` against the default categories ignoring case and returns the
/// canonical spelling.
pub fn parse_category_input(s: &str) -> Result<String, AppError> {
    let s = s.trim();
    DEFAULT_CATEGORIES
        .iter()
        .find(|c| c.eq_ignore_ascii_case(s))
        .map(|c| c.to_string())
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "unknown category '{}', choose one of {}",
                s,
                DEFAULT_CATEGORIES.join(", ")
            ))
        })
}

/// Parses `AMOUNT:CATEGORY[:NOTES]`. Notes may themselves contain colons.
pub fn parse_entry(s: &str) -> Result<NewExpense, AppError> {
    let mut parts = s.splitn(3, ':');
    let amount = parts.next().unwrap_or_default();
    let category = parts
        .next()
        .ok_or_else(|| AppError::InvalidInput(format!("'{}' is not AMOUNT:CATEGORY[:NOTES]", s)))?;
    let notes = parts.next().unwrap_or_default();

    Ok(NewExpense::new(
        parse_amount_input(amount)?,
        parse_category_input(category)?,
        notes.trim(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use rust_decimal_macros::dec;
    use std::{io::Cursor, sync::Arc};

    fn run_form(form: &mut DayForm, answers: &str) -> (bool, String) {
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut output = Vec::new();
        let submitted = form.run(&mut input, &mut output).unwrap();
        (submitted, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_prefill_pads_to_five_rows() {
        let form = DayForm::prefill(&[]);
        assert_eq!(form.rows.len(), MIN_ROWS);
        assert!(form.rows.iter().all(|r| r == &NewExpense::new(dec!(0), "Shopping", "")));
    }

    #[test]
    fn test_prefill_keeps_every_existing_record() {
        let service = ExpenseService::new(Arc::new(InMemoryStorage::new()));
        let entries: Vec<_> = (1..=7).map(|i| NewExpense::new(Decimal::from(i), "Food", "")).collect();
        service.replace_day("2024-08-01", entries).unwrap();

        let form = DayForm::prefill(&service.fetch_day("2024-08-01").unwrap());
        assert_eq!(form.rows.len(), 7);
        assert_eq!(form.rows[6].amount, dec!(7));
    }

    #[test]
    fn test_form_edits_first_row_and_keeps_the_rest() {
        let mut form = DayForm::prefill(&[]);
        let mut answers = String::from("12.5\nfood\nCoffee\n");
        answers.push_str(&"\n\n\n".repeat(4));
        answers.push_str("y\n");

        let (submitted, _) = run_form(&mut form, &answers);
        assert!(submitted);
        assert_eq!(form.rows[0], NewExpense::new(dec!(12.5), "Food", "Coffee"));
        assert_eq!(form.rows[1], NewExpense::new(dec!(0), "Shopping", ""));
    }

    #[test]
    fn test_form_reprompts_on_bad_input() {
        let mut form = DayForm::prefill(&[]);
        let mut answers = String::from("abc\n-4\n3\nGroceries\nrent\n\n");
        answers.push_str(&"\n\n\n".repeat(4));
        answers.push_str("yes\n");

        let (submitted, output) = run_form(&mut form, &answers);
        assert!(submitted);
        assert!(output.contains("'abc' is not an amount"));
        assert!(output.contains("unknown category 'Groceries'"));
        assert_eq!(form.rows[0], NewExpense::new(dec!(3), "Rent", ""));
    }

    #[test]
    fn test_form_aborts_on_eof_or_no() {
        let mut form = DayForm::prefill(&[]);
        let (submitted, _) = run_form(&mut form, "5\n");
        assert!(!submitted);

        let mut form = DayForm::prefill(&[]);
        let answers = format!("{}n\n", "\n\n\n".repeat(5));
        let (submitted, _) = run_form(&mut form, &answers);
        assert!(!submitted);
    }

    #[test]
    fn test_submit_drops_blank_rows() {
        let service = ExpenseService::new(Arc::new(InMemoryStorage::new()));
        let mut form = DayForm::prefill(&[]);
        form.rows[0] = NewExpense::new(dec!(100), "Rent", "");

        assert_eq!(form.submit(&service, "2024-08-01").unwrap(), 1);
        assert_eq!(service.fetch_day("2024-08-01").unwrap().len(), 1);
    }

    #[test]
    fn test_parse_entry() {
        assert_eq!(
            parse_entry("12.5:food:Coffee: large").unwrap(),
            NewExpense::new(dec!(12.5), "Food", "Coffee: large")
        );
        assert_eq!(parse_entry("$40:Rent").unwrap(), NewExpense::new(dec!(40), "Rent", ""));
        assert!(parse_entry("40").is_err());
        assert!(parse_entry("forty:Rent").is_err());
    }
}

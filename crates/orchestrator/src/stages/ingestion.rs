use async_trait::async_trait;
use chrono::NaiveDate;
use insights_core::{SalesRecord, Stage};

use crate::error::StageError;
use crate::stage::{Requirement, StageContext, StageHandler};

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Largest unit price accepted from an export; beyond it revenue sums can overflow.
pub const MAX_UNIT_PRICE: f64 = 1_000_000.0;

#[derive(Debug, Default)]
pub struct ParsedSales {
    pub records: Vec<SalesRecord>,
    /// One entry per rejected line, with its 1-based line number.
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    date: usize,
    item: usize,
    quantity: usize,
    price: usize,
}

impl Columns {
    const POSITIONAL: Columns = Columns {
        date: 0,
        item: 1,
        quantity: 2,
        price: 3,
    };

    fn from_header(fields: &[String]) -> Option<Self> {
        let find = |names: &[&str]| {
            fields.iter().position(|f| {
                let f = f.trim().to_lowercase().replace(' ', "_");
                names.contains(&f.as_str())
            })
        };
        Some(Self {
            date: find(&["date", "day", "sold_at"])?,
            item: find(&["item", "item_name", "name", "product", "dish"])?,
            quantity: find(&["quantity", "qty", "units", "count"])?,
            price: find(&["unit_price", "price", "amount"])?,
        })
    }
}

/// Splits one CSV line, honouring double-quoted fields.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn parse_price(raw: &str) -> Option<f64> {
    raw.trim()
        .trim_start_matches(['$', '€', '£'])
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && p.abs() <= MAX_UNIT_PRICE)
}

/// Parses sales rows. A header is used when present; otherwise columns are
/// taken as `date,item,quantity,unit_price`.
pub fn parse_sales_csv(csv: &str) -> ParsedSales {
    let mut parsed = ParsedSales::default();
    let mut lines = csv
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .peekable();

    let mut columns = Columns::POSITIONAL;
    if let Some((_, first)) = lines.peek() {
        if let Some(found) = Columns::from_header(&split_line(first)) {
            columns = found;
            lines.next();
        }
    }

    for (index, line) in lines {
        let fields = split_line(line);
        let get = |i: usize| fields.get(i).map(|s| s.trim()).unwrap_or("");

        let date = parse_date(get(columns.date));
        let item = get(columns.item);
        let quantity = get(columns.quantity).parse::<u32>().ok();
        let price = parse_price(get(columns.price));

        match (date, quantity, price) {
            (Some(date), Some(quantity), Some(unit_price)) if !item.is_empty() => {
                parsed.records.push(SalesRecord {
                    date,
                    item_name: item.to_string(),
                    quantity,
                    unit_price,
                });
            }
            _ => parsed
                .rejected
                .push(format!("line {}: {}", index + 1, line.trim())),
        }
    }
    parsed
}

#[derive(Debug, Clone, Copy)]
pub struct DataIngestionStage;

#[async_trait]
impl StageHandler for DataIngestionStage {
    fn stage(&self) -> Stage {
        Stage::DataIngestion
    }

    fn requirement(&self) -> Requirement {
        Requirement::SalesCsv
    }

    async fn execute(&self, ctx: &mut StageContext<'_>) -> Result<(), StageError> {
        let csv = ctx.inputs.sales_csv.as_deref().unwrap_or_default();
        let parsed = parse_sales_csv(csv);

        if parsed.records.is_empty() {
            return Err(StageError::InvalidInput(format!(
                "sales CSV has no valid rows ({} rejected)",
                parsed.rejected.len()
            )));
        }

        let total = parsed.records.len() + parsed.rejected.len();
        let confidence = parsed.records.len() as f64 / total as f64;
        let mut observations = vec![format!(
            "{} of {} rows parsed",
            parsed.records.len(),
            total
        )];
        observations.extend(parsed.rejected.iter().take(5).map(|r| format!("rejected {r}")));

        let decisions = if parsed.rejected.is_empty() {
            vec![]
        } else {
            vec!["continued without the rejected rows".to_string()]
        };

        ctx.session.data.sales_records = Some(parsed.records);
        ctx.think("Parsed the uploaded sales export", observations, decisions, confidence);
        Ok(())
    }
}

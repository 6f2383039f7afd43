use super::{Transition, TransitionHash, TransitionRecord, TransitionStore};
use crate::domain::{SmhError, SmhResult};
use std::collections::HashMap;

const TABLE_HEADER: [Column; 9] = [
    Column::Wavelength,
    Column::Species,
    Column::ExcitationPotential,
    Column::LogGf,
    Column::Damping,
    Column::DissociationEnergy,
    Column::EquivalentWidth,
    Column::Hash,
    Column::Comments,
];
const MOOG_NUMERIC_FIELDS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Wavelength,
    Species,
    ExcitationPotential,
    LogGf,
    Damping,
    DissociationEnergy,
    EquivalentWidth,
    Hash,
    Comments,
}

impl Column {
    fn from_header(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "wavelength" => Some(Self::Wavelength),
            "species" => Some(Self::Species),
            "expot" => Some(Self::ExcitationPotential),
            "loggf" => Some(Self::LogGf),
            "damp_vdw" => Some(Self::Damping),
            "dissoc_e" => Some(Self::DissociationEnergy),
            "equivalent_width" | "ew" => Some(Self::EquivalentWidth),
            "hash" => Some(Self::Hash),
            "comments" | "comment" => Some(Self::Comments),
            _ => None,
        }
    }

    const fn header(self) -> &'static str {
        match self {
            Self::Wavelength => "wavelength",
            Self::Species => "species",
            Self::ExcitationPotential => "expot",
            Self::LogGf => "loggf",
            Self::Damping => "damp_vdw",
            Self::DissociationEnergy => "dissoc_E",
            Self::EquivalentWidth => "equivalent_width",
            Self::Hash => "hash",
            Self::Comments => "comments",
        }
    }
}

pub(super) fn parse_line_list(source: &str) -> SmhResult<TransitionStore> {
    let mut lines = source
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .peekable();

    let Some(&(first_number, first_line)) = lines.peek() else {
        return Ok(TransitionStore::new());
    };

    let first_tokens: Vec<&str> = first_line.split_whitespace().collect();
    let header = if first_tokens
        .iter()
        .any(|token| token.eq_ignore_ascii_case("wavelength"))
    {
        lines.next();
        Some(parse_header(first_number, &first_tokens)?)
    } else {
        if parse_number(first_tokens[0]).is_none() {
            // MOOG title line.
            lines.next();
        }
        None
    };

    let mut transitions = Vec::new();
    let mut first_seen: HashMap<TransitionHash, usize> = HashMap::new();
    for (line_number, line) in lines {
        let (record, stored_hash) = match &header {
            Some(columns) => parse_table_row(line_number, line, columns)?,
            None => (parse_moog_row(line_number, line)?, None),
        };

        let transition = Transition::new(record).map_err(|error| {
            SmhError::parse(
                "LINELIST.PARSE",
                format!("line {line_number}: {}", error.message()),
            )
        })?;

        if let Some(stored_hash) = stored_hash {
            if stored_hash != transition.hash() {
                return Err(SmhError::parse(
                    "LINELIST.HASH_MISMATCH",
                    format!(
                        "line {line_number}: stored hash {stored_hash} does not match computed hash {}",
                        transition.hash()
                    ),
                ));
            }
        }

        if let Some(previous) = first_seen.insert(transition.hash(), line_number) {
            return Err(SmhError::parse(
                "LINELIST.DUPLICATE",
                format!("line {line_number} repeats the transition on line {previous}"),
            ));
        }
        transitions.push(transition);
    }

    TransitionStore::from_transitions(transitions)
}

fn parse_header(line_number: usize, tokens: &[&str]) -> SmhResult<Vec<Column>> {
    let mut columns = Vec::with_capacity(tokens.len());
    for token in tokens {
        let column = Column::from_header(token).ok_or_else(|| {
            SmhError::parse(
                "LINELIST.HEADER",
                format!("line {line_number}: unknown column '{token}'"),
            )
        })?;
        if columns.contains(&column) {
            return Err(SmhError::parse(
                "LINELIST.HEADER",
                format!("line {line_number}: column '{token}' appears twice"),
            ));
        }
        columns.push(column);
    }

    for required in [
        Column::Wavelength,
        Column::Species,
        Column::ExcitationPotential,
        Column::LogGf,
    ] {
        if !columns.contains(&required) {
            return Err(SmhError::parse(
                "LINELIST.HEADER",
                format!(
                    "line {line_number}: required column '{}' is missing",
                    required.header()
                ),
            ));
        }
    }

    Ok(columns)
}

fn parse_table_row(
    line_number: usize,
    line: &str,
    columns: &[Column],
) -> SmhResult<(TransitionRecord, Option<TransitionHash>)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let trailing_comments = columns.last() == Some(&Column::Comments);
    let fixed_columns = if trailing_comments {
        columns.len() - 1
    } else {
        columns.len()
    };

    if tokens.len() < fixed_columns || (!trailing_comments && tokens.len() > columns.len()) {
        return Err(SmhError::parse(
            "LINELIST.PARSE",
            format!(
                "line {line_number}: expected {} column(s), found {}",
                columns.len(),
                tokens.len()
            ),
        ));
    }

    let mut record = TransitionRecord::new(f64::NAN, f64::NAN, f64::NAN, f64::NAN);
    let mut hash = None;
    for (position, column) in columns.iter().enumerate() {
        if *column == Column::Comments {
            let comment = if trailing_comments && position == columns.len() - 1 {
                tokens[position.min(tokens.len())..].join(" ")
            } else {
                tokens[position].to_string()
            };
            record.comment = if comment == "-" { String::new() } else { comment };
            continue;
        }

        let token = tokens[position];
        match column {
            Column::Wavelength => record.wavelength = required(line_number, *column, token)?,
            Column::Species => record.species = required(line_number, *column, token)?,
            Column::ExcitationPotential => {
                record.excitation_potential = required(line_number, *column, token)?
            }
            Column::LogGf => record.log_gf = required(line_number, *column, token)?,
            Column::Damping => record.damping = optional(line_number, *column, token)?,
            Column::DissociationEnergy => {
                record.dissociation_energy = optional(line_number, *column, token)?
            }
            Column::EquivalentWidth => {
                record.equivalent_width = optional(line_number, *column, token)?
            }
            Column::Hash => {
                hash = if is_missing(token) {
                    None
                } else {
                    Some(token.parse::<TransitionHash>().map_err(|error| {
                        SmhError::parse(
                            "LINELIST.PARSE",
                            format!("line {line_number}: {}", error.message()),
                        )
                    })?)
                };
            }
            Column::Comments => {}
        }
    }

    Ok((record, hash))
}

fn parse_moog_row(line_number: usize, line: &str) -> SmhResult<TransitionRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let numeric_count = tokens
        .iter()
        .take(MOOG_NUMERIC_FIELDS)
        .take_while(|token| parse_number(token).is_some())
        .count();
    if numeric_count < 4 {
        return Err(SmhError::parse(
            "LINELIST.PARSE",
            format!(
                "line {line_number}: expected at least 4 numeric fields (wavelength species expot loggf), found {numeric_count}"
            ),
        ));
    }

    let values: Vec<f64> = tokens[..numeric_count]
        .iter()
        .filter_map(|token| parse_number(token))
        .collect();
    let finite_at = |index: usize| values.get(index).copied().filter(|value| value.is_finite());

    let mut record = TransitionRecord::new(values[0], values[1], values[2], values[3]);
    record.damping = finite_at(4);
    record.dissociation_energy = finite_at(5);
    record.equivalent_width = finite_at(6);
    record.comment = tokens[numeric_count..].join(" ");
    Ok(record)
}

fn required(line_number: usize, column: Column, token: &str) -> SmhResult<f64> {
    parse_number(token)
        .filter(|value| value.is_finite())
        .ok_or_else(|| {
            SmhError::parse(
                "LINELIST.PARSE",
                format!(
                    "line {line_number}: column '{}' expects a finite number, got '{token}'",
                    column.header()
                ),
            )
        })
}

fn optional(line_number: usize, column: Column, token: &str) -> SmhResult<Option<f64>> {
    if is_missing(token) {
        return Ok(None);
    }
    required(line_number, column, token).map(Some)
}

fn is_missing(token: &str) -> bool {
    token == "-" || token.eq_ignore_ascii_case("nan")
}

fn parse_number(token: &str) -> Option<f64> {
    if is_missing(token) {
        return Some(f64::NAN);
    }
    token.parse::<f64>().ok()
}

pub(super) fn render_line_list(transitions: &[Transition]) -> String {
    let mut output = String::new();
    let header: Vec<&str> = TABLE_HEADER.iter().map(|column| column.header()).collect();
    output.push_str(&header.join(" "));
    output.push('\n');

    let render_optional = |value: Option<f64>| value.map_or("nan".to_string(), |value| value.to_string());
    for transition in transitions {
        output.push_str(&format!(
            "{} {} {} {} {} {} {} {} {}\n",
            transition.wavelength(),
            transition.species().code(),
            transition.excitation_potential(),
            transition.log_gf(),
            render_optional(transition.damping()),
            render_optional(transition.dissociation_energy()),
            render_optional(transition.equivalent_width()),
            transition.hash(),
            transition.comment(),
        ));
    }
    output
}

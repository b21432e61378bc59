use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io::{BufRead, Write};

/// FIPS bounds for one state. The lower bound is exclusive: a county
/// whose code equals the bound itself is filtered out. The bounds are
/// contiguous blocks, not exact code sets, so they are an approximation
/// for states whose allocations are not one contiguous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FipsRange {
    pub lower: u32,
    pub upper: u32,
}

impl FipsRange {
    pub fn contains(&self, fips: u32) -> bool {
        fips > self.lower && fips < self.upper
    }
}

/// State code to FIPS bounds, values carried over verbatim from the
/// source dataset this tool was built for. The table is authoritative:
/// membership here is the only validation a state code gets.
pub static STATE_FIPS: Lazy<HashMap<&'static str, FipsRange>> = Lazy::new(|| {
    let bounds: [(&str, u32, u32); 50] = [
        ("AL", 1000, 2000),
        ("AK", 2000, 2300),
        ("AZ", 4000, 5000),
        ("AR", 5000, 6000),
        ("CA", 6000, 8000),
        ("CO", 8000, 9000),
        ("CT", 9000, 10000),
        ("DE", 10000, 12000),
        ("FL", 12000, 13000),
        ("GA", 13000, 15000),
        ("HI", 15000, 16000),
        ("ID", 16000, 17000),
        ("IL", 17000, 18000),
        ("IN", 18000, 19000),
        ("IA", 19000, 20000),
        ("KS", 20000, 21000),
        ("KY", 21000, 22000),
        ("LA", 22000, 23000),
        ("ME", 23000, 24000),
        ("MD", 24000, 25000),
        ("MA", 25000, 26000),
        ("MI", 26000, 27000),
        ("MN", 27000, 28000),
        ("MS", 28000, 29000),
        ("MO", 29000, 30000),
        ("MT", 30000, 31000),
        ("NE", 31000, 32000),
        ("NV", 32000, 33000),
        ("NH", 33000, 34000),
        ("NJ", 34000, 35000),
        ("NM", 35000, 36000),
        ("NY", 36000, 37000),
        ("NC", 37000, 38000),
        ("ND", 38000, 39000),
        ("OH", 39000, 40000),
        ("OK", 40000, 41000),
        ("OR", 41000, 42000),
        ("PA", 42000, 44000),
        ("RI", 44000, 45000),
        ("SC", 45000, 46000),
        ("SD", 46000, 47000),
        ("TN", 47000, 48000),
        ("TX", 48000, 49000),
        ("UT", 49000, 50000),
        ("VT", 51000, 52000),
        ("VA", 52000, 53000),
        ("WA", 53000, 54000),
        ("WV", 54000, 55000),
        ("WI", 55000, 56000),
        ("WY", 56000, 57000),
    ];
    bounds
        .iter()
        .map(|&(code, lower, upper)| (code, FipsRange { lower, upper }))
        .collect()
});

pub fn fips_range(state: &str) -> Option<FipsRange> {
    STATE_FIPS.get(state).copied()
}

/// Validate a code supplied on the command line. Upper-cases the input;
/// rejects anything that is not a key of the table.
pub fn validate_state(input: &str) -> Result<String> {
    let state = input.trim().to_uppercase();
    if STATE_FIPS.contains_key(state.as_str()) {
        Ok(state)
    } else {
        Err(anyhow!(
            "'{}' is not a supported two letter state abbreviation",
            input
        ))
    }
}

/// Interactive selector: re-prompts until the input, upper-cased, is a
/// key of the table. Errors only when the input stream ends.
pub fn prompt_state(input: &mut impl BufRead, output: &mut impl Write) -> Result<String> {
    loop {
        write!(
            output,
            "Which state would you like a map of? (Enter the two letter abbreviation): "
        )?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(anyhow!("input closed before a valid state was entered"));
        }

        let state = line.trim().to_uppercase();
        if STATE_FIPS.contains_key(state.as_str()) {
            return Ok(state);
        }
        writeln!(
            output,
            "Please retry, you must enter only the two letter abbreviation of the state"
        )?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn table_covers_all_fifty_states() {
        assert_eq!(STATE_FIPS.len(), 50);
    }

    #[test]
    fn every_table_key_validates() {
        for code in STATE_FIPS.keys() {
            assert_eq!(validate_state(code).unwrap(), *code);
            assert_eq!(validate_state(&code.to_lowercase()).unwrap(), *code);
        }
    }

    #[test]
    fn unknown_codes_are_rejected() {
        for bad in ["ZZ", "Q", "USA", "", "R I"] {
            assert!(validate_state(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn ri_bounds() {
        let range = fips_range("RI").unwrap();
        assert_eq!(range, FipsRange { lower: 44000, upper: 45000 });
    }

    #[test]
    fn lower_bound_is_exclusive() {
        let range = fips_range("RI").unwrap();
        assert!(!range.contains(44000));
        assert!(range.contains(44001));
        assert!(range.contains(44999));
        assert!(!range.contains(45000));
    }

    #[test]
    fn prompt_retries_until_valid() {
        let mut input = Cursor::new(b"narnia\nxx\nri\n".to_vec());
        let mut output = Vec::new();
        let state = prompt_state(&mut input, &mut output).unwrap();
        assert_eq!(state, "RI");

        let transcript = String::from_utf8(output).unwrap();
        assert_eq!(transcript.matches("Please retry").count(), 2);
    }

    #[test]
    fn prompt_errors_on_eof() {
        let mut input = Cursor::new(b"nope\n".to_vec());
        let mut output = Vec::new();
        assert!(prompt_state(&mut input, &mut output).is_err());
    }
}

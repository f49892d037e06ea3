//! Numeral spelling.

use std::sync::OnceLock;

use regex::{Captures, Regex};

const ONES: [&str; 20] = [
    "zero",
    "one",
    "two",
    "three",
    "four",
    "five",
    "six",
    "seven",
    "eight",
    "nine",
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

const SCALES: [(u64, &str); 4] = [
    (1_000_000_000_000, "trillion"),
    (1_000_000_000, "billion"),
    (1_000_000, "million"),
    (1_000, "thousand"),
];

/// Spell a non-negative integer, e.g. `42` → `"forty two"`.
pub fn number_to_words(n: u64) -> String {
    if n < 20 {
        return ONES[n as usize].to_string();
    }
    if n < 100 {
        let tens = TENS[(n / 10) as usize];
        return match n % 10 {
            0 => tens.to_string(),
            rest => format!("{} {}", tens, ONES[rest as usize]),
        };
    }
    if n < 1_000 {
        let head = format!("{} hundred", ONES[(n / 100) as usize]);
        return match n % 100 {
            0 => head,
            rest => format!("{} {}", head, number_to_words(rest)),
        };
    }
    for (scale, name) in SCALES {
        if n >= scale {
            let head = format!("{} {}", number_to_words(n / scale), name);
            return match n % scale {
                0 => head,
                rest => format!("{} {}", head, number_to_words(rest)),
            };
        }
    }
    unreachable!("every n >= 1000 matches the thousand scale")
}

fn numeral_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)(?:\.(\d+))?").expect("static numeral pattern"))
}

/// Replace every numeral in `text` with its spoken form.
///
/// Decimals are read digit by digit after "point". Numerals too large for
/// `u64` are left as-is.
pub fn spell_numerals(text: &str) -> String {
    numeral_regex()
        .replace_all(text, |caps: &Captures| {
            let whole = &caps[1];
            let Ok(value) = whole.parse::<u64>() else {
                return caps[0].to_string();
            };
            let mut spoken = number_to_words(value);
            if let Some(fraction) = caps.get(2) {
                spoken.push_str(" point");
                for digit in fraction.as_str().chars() {
                    match digit.to_digit(10) {
                        Some(d) => {
                            spoken.push(' ');
                            spoken.push_str(ONES[d as usize]);
                        }
                        None => spoken.push(digit),
                    }
                }
            }
            spoken
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_numbers() {
        assert_eq!(number_to_words(0), "zero");
        assert_eq!(number_to_words(7), "seven");
        assert_eq!(number_to_words(19), "nineteen");
        assert_eq!(number_to_words(40), "forty");
        assert_eq!(number_to_words(42), "forty two");
    }

    #[test]
    fn hundreds_and_scales() {
        assert_eq!(number_to_words(100), "one hundred");
        assert_eq!(number_to_words(123), "one hundred twenty three");
        assert_eq!(number_to_words(1_000), "one thousand");
        assert_eq!(number_to_words(2_005), "two thousand five");
        assert_eq!(
            number_to_words(3_400_010),
            "three million four hundred thousand ten"
        );
    }

    #[test]
    fn spells_numerals_inside_text() {
        assert_eq!(spell_numerals("2  plus  3"), "two  plus  three");
        assert_eq!(spell_numerals("x to the 10"), "x to the ten");
        assert_eq!(spell_numerals("3.14"), "three point one four");
        assert_eq!(spell_numerals("no digits"), "no digits");
    }
}

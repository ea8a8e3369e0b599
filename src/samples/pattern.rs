// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Filename patterns used by preset definitions.
//!
//! A pattern is literal text mixed with `*` and the placeholders `%midinote`,
//! `%velocity` and `%notename`. Matching is anchored at the start of the
//! filename only, so a pattern that consumes a prefix of the name matches.

use super::definition::DefinitionSyntaxError;

const MIDINOTE: &str = "%midinote";
const VELOCITY: &str = "%velocity";
const NOTENAME: &str = "%notename";

/// A single piece of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// Any run of characters, shortest first.
    Wildcard,
    /// One or more ASCII digits, longest first.
    MidiNote,
    /// One or more ASCII digits, longest first.
    Velocity,
    /// `[A-Ga-g]#?[0-9]`
    NoteName,
}

/// Values captured by a successful match.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captures {
    pub midinote: Option<String>,
    pub velocity: Option<String>,
    pub notename: Option<String>,
}

/// A compiled filename pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compiles the given pattern text.
    pub fn compile(text: &str) -> Result<Pattern, DefinitionSyntaxError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(c) = rest.chars().next() {
            let placeholder = [
                (MIDINOTE, Segment::MidiNote),
                (VELOCITY, Segment::Velocity),
                (NOTENAME, Segment::NoteName),
            ]
            .into_iter()
            .find(|(name, _)| rest.starts_with(name));

            let (segment, consumed) = match (c, placeholder) {
                (_, Some((name, segment))) => (Some(segment), name.len()),
                ('*', None) => (Some(Segment::Wildcard), 1),
                (c, None) => {
                    literal.push(c);
                    (None, c.len_utf8())
                }
            };

            if let Some(segment) = segment {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                // Consecutive wildcards behave like one.
                if !(segment == Segment::Wildcard && segments.last() == Some(&Segment::Wildcard)) {
                    segments.push(segment);
                }
            }
            rest = &rest[consumed..];
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if segments.is_empty() {
            return Err(DefinitionSyntaxError::EmptyPattern);
        }
        Ok(Pattern { segments })
    }

    /// Matches the pattern against the start of the given filename.
    pub fn matches(&self, name: &str) -> Option<Captures> {
        let mut captures = Captures::default();
        if match_from(&self.segments, name, &mut captures) {
            Some(captures)
        } else {
            None
        }
    }
}

/// Backtracking matcher. The first successful path wins, which mirrors the
/// preference order of the quantifiers: wildcards try the shortest span,
/// digit runs the longest.
fn match_from(segments: &[Segment], input: &str, captures: &mut Captures) -> bool {
    let Some((segment, rest)) = segments.split_first() else {
        return true;
    };

    match segment {
        Segment::Literal(text) => input
            .strip_prefix(text.as_str())
            .is_some_and(|remaining| match_from(rest, remaining, captures)),
        Segment::Wildcard => input
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(input.len()))
            .any(|i| match_from(rest, &input[i..], captures)),
        Segment::MidiNote | Segment::Velocity => {
            let digits = input.bytes().take_while(u8::is_ascii_digit).count();
            (1..=digits).rev().any(|len| {
                let value = Some(input[..len].to_string());
                if *segment == Segment::MidiNote {
                    captures.midinote = value;
                } else {
                    captures.velocity = value;
                }
                match_from(rest, &input[len..], captures)
            })
        }
        Segment::NoteName => {
            let bytes = input.as_bytes();
            if !bytes.first().is_some_and(|b| matches!(*b, b'A'..=b'G' | b'a'..=b'g')) {
                return false;
            }
            // Prefer the sharp when one is present.
            [2usize, 1].into_iter().any(|digit_at| {
                let sharp_ok = digit_at == 1 || bytes.get(1) == Some(&b'#');
                if !sharp_ok || !bytes.get(digit_at).is_some_and(u8::is_ascii_digit) {
                    return false;
                }
                captures.notename = Some(input[..=digit_at].to_string());
                match_from(rest, &input[digit_at + 1..], captures)
            })
        }
    }
}

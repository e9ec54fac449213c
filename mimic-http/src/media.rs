// Copyright ⓒ 2024-2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Media types and their negotiation.
//!
//! A declared media type matches a requested one with a [`Precision`]: an
//! exact match is preferred over a subtype range (`text/*`), which is
//! preferred over a wildcard (`*/*`). Ties are broken by the number of
//! matching parameters.

use std::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use crate::{Error, Result};

const WILDCARD: &str = "*";

pub const APPLICATION_JSON: &str = "application/json";

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MediaType {
    kind: String,
    subtype: String,
    parameters: Vec<(String, String)>,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Specificity {
    Wildcard,
    Range,
    Exact,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Precision {
    pub specificity: Specificity,
    pub parameters: usize,
}

impl Ord for Precision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.specificity
            .cmp(&other.specificity)
            .then(self.parameters.cmp(&other.parameters))
    }
}

impl PartialOrd for Precision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl MediaType {
    pub fn new(kind: &str, subtype: &str) -> Self {
        Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parameters: Vec::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// The media type without parameters, e.g. `text/plain`.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.kind, self.subtype)
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_range(&self) -> bool {
        self.kind == WILDCARD || self.subtype == WILDCARD
    }

    pub fn is_json(&self) -> bool {
        self.subtype == "json" || self.subtype.ends_with("+json")
    }

    pub fn is_xml(&self) -> bool {
        self.subtype == "xml" || self.subtype.ends_with("+xml")
    }

    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }

    pub fn is_form(&self) -> bool {
        self.kind == "application" && self.subtype == "x-www-form-urlencoded"
    }

    pub fn is_multipart(&self) -> bool {
        self.kind == "multipart"
    }

    /// How precisely this (declared) media type matches `requested`,
    /// either of which may be a range.
    pub fn precision(&self, requested: &MediaType) -> Option<Precision> {
        let specificity = if self.kind == WILDCARD || requested.kind == WILDCARD {
            Specificity::Wildcard
        } else if self.kind != requested.kind {
            return None;
        } else if self.subtype == WILDCARD || requested.subtype == WILDCARD {
            Specificity::Range
        } else if self.subtype != requested.subtype {
            return None;
        } else {
            Specificity::Exact
        };

        let parameters = self
            .parameters
            .iter()
            .filter(|(key, value)| {
                requested
                    .parameter(key)
                    .is_some_and(|requested| requested.eq_ignore_ascii_case(value))
            })
            .count();

        Some(Precision {
            specificity,
            parameters,
        })
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(';');

        let essence = parts.next().map(str::trim).unwrap_or_default();

        let (kind, subtype) = essence
            .split_once('/')
            .map(|(kind, subtype)| (kind.trim(), subtype.trim()))
            .filter(|(kind, subtype)| !kind.is_empty() && !subtype.is_empty())
            .ok_or_else(|| Error::BadRequest(format!("invalid media type \"{s}\"")))?;

        let parameters = parts
            .filter_map(|parameter| parameter.split_once('='))
            .map(|(key, value)| {
                (
                    key.trim().to_ascii_lowercase(),
                    value.trim().trim_matches('"').to_owned(),
                )
            })
            .collect();

        Ok(Self {
            parameters,
            ..Self::new(kind, subtype)
        })
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)?;

        for (key, value) in &self.parameters {
            write!(f, "; {key}={value}")?;
        }

        Ok(())
    }
}

/// The declared media type best matching a `Content-Type`.
///
/// Declared keys that fail to parse are ignored. Among equally precise
/// matches the first declared wins.
pub fn best_match<'a, I>(declared: I, requested: &MediaType) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    declared
        .into_iter()
        .filter_map(|key| {
            key.parse::<MediaType>()
                .ok()
                .and_then(|media| media.precision(requested))
                .map(|precision| (key, precision))
        })
        .fold(None, |best: Option<(&'a str, Precision)>, (key, precision)| match best {
            Some((_, current)) if current >= precision => best,
            _ => Some((key, precision)),
        })
        .map(|(key, _)| key)
}

/// The ranges of an `Accept` header, most preferred first.
///
/// An empty header accepts anything. Ranges with `q=0` are dropped.
pub fn accepted(accept: &str) -> Vec<MediaType> {
    if accept.trim().is_empty() {
        return vec![MediaType::new(WILDCARD, WILDCARD)];
    }

    let mut ranges = accept
        .split(',')
        .filter_map(|range| range.parse::<MediaType>().ok())
        .map(|range| {
            let quality = range
                .parameter("q")
                .and_then(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            (range, quality)
        })
        .filter(|(_, quality)| *quality > 0.0)
        .collect::<Vec<_>>();

    ranges.sort_by(|(_, a), (_, b)| b.total_cmp(a));
    ranges.into_iter().map(|(range, _)| range).collect()
}

/// A negotiated response media type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Negotiated<'a> {
    /// The key of the response content map.
    pub declared: &'a str,

    /// The `Content-Type` of the response.
    pub content_type: String,
}

/// Choose the declared response media type best matching `accept`.
///
/// A declared range answers with the accepted media type when that is
/// concrete, and with `application/json` otherwise.
pub fn negotiate<'a, I>(declared: I, accept: &str) -> Option<Negotiated<'a>>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    accepted(accept).into_iter().find_map(|range| {
        best_match(declared.clone(), &range).map(|key| {
            let content_type = match key.parse::<MediaType>() {
                Ok(media) if media.is_range() && !range.is_range() => range.essence(),
                Ok(media) if media.kind == WILDCARD => APPLICATION_JSON.to_owned(),
                Ok(media) if media.is_range() => format!("{}/{}", media.kind, "plain"),
                _ => key.to_owned(),
            };

            Negotiated {
                declared: key,
                content_type,
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn media(s: &str) -> MediaType {
        s.parse().unwrap()
    }

    #[test]
    fn parse() -> Result<()> {
        let media = "Multipart/Form-Data; boundary=\"abc\"".parse::<MediaType>()?;
        assert_eq!("multipart", media.kind());
        assert_eq!("form-data", media.subtype());
        assert_eq!(Some("abc"), media.parameter("Boundary"));
        assert!(media.is_multipart());

        assert!("json".parse::<MediaType>().is_err());
        assert!(media_is_json("application/problem+json"));
        Ok(())
    }

    fn media_is_json(s: &str) -> bool {
        media(s).is_json()
    }

    #[test]
    fn exact_beats_range_beats_wildcard() {
        let requested = media("text/plain");

        assert_eq!(
            Some("text/plain"),
            best_match(["*/*", "text/*", "text/plain"], &requested)
        );
        assert_eq!(Some("text/*"), best_match(["*/*", "text/*"], &requested));
        assert_eq!(Some("*/*"), best_match(["application/json", "*/*"], &requested));
        assert_eq!(None, best_match(["application/json"], &requested));
    }

    #[test]
    fn parameters_break_ties() {
        let requested = media("text/plain; charset=utf-8");

        assert_eq!(
            Some("text/plain; charset=utf-8"),
            best_match(["text/plain", "text/plain; charset=utf-8"], &requested)
        );
        assert_eq!(
            Some("text/plain"),
            best_match(["text/plain", "text/plain; charset=latin1"], &requested)
        );
    }

    #[test]
    fn accept_quality_order() {
        assert_eq!(
            vec!["application/json", "text/plain"],
            accepted("text/plain;q=0.5, application/json, image/png;q=0")
                .iter()
                .map(MediaType::essence)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn negotiation() {
        assert_eq!(
            Some(Negotiated {
                declared: "*/*",
                content_type: APPLICATION_JSON.into()
            }),
            negotiate(["*/*"], "")
        );

        assert_eq!(
            Some(Negotiated {
                declared: "*/*",
                content_type: APPLICATION_JSON.into()
            }),
            negotiate(["*/*"], "*/*")
        );

        assert_eq!(
            Some(Negotiated {
                declared: "*/*",
                content_type: "text/csv".into()
            }),
            negotiate(["*/*"], "text/csv")
        );

        assert_eq!(
            Some(Negotiated {
                declared: "application/xml",
                content_type: "application/xml".into()
            }),
            negotiate(["application/json", "application/xml"], "application/xml")
        );

        assert_eq!(None, negotiate(["text/plain"], "image/*"));
    }
}

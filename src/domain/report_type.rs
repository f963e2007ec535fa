//! ISW report categories
//!
//! The ISW portal exposes a fixed dropdown of report categories. Each category
//! is addressed by a numeric option value; callers may refer to a category by
//! its display name, its numeric code, or the underscore-marked code (`_24`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported report type '{0}'")]
pub struct UnknownReportType(pub String);

macro_rules! report_types {
    ($($variant:ident => ($code:literal, $label:literal)),+ $(,)?) => {
        /// Report category selectable on the ISW "Reports Root" page
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ReportType {
            $($variant),+
        }

        impl ReportType {
            /// Every category, in the order the portal lists them
            pub const ALL: &'static [ReportType] = &[$(ReportType::$variant),+];

            /// Numeric option value used by the portal's `reportTypeId` select
            pub const fn code(self) -> u8 {
                match self {
                    $(ReportType::$variant => $code),+
                }
            }

            /// Human readable category name
            pub const fn label(self) -> &'static str {
                match self {
                    $(ReportType::$variant => $label),+
                }
            }
        }
    };
}

report_types! {
    AllCategories => (0, "All Categories"),
    AtmDetail => (24, "ATM Detail"),
    Autopay => (1, "Autopay"),
    BillPayment => (20, "BillPayment"),
    BillsOnline => (2, "BillsOnline"),
    CashCard => (3, "CashCard"),
    Glo => (4, "Glo"),
    IsoDetail => (21, "ISO Detail"),
    Extract => (22, "Extract"),
    Mastercard => (23, "Mastercard"),
    Miscellaneous => (19, "Miscellaneous"),
    Mobility => (12, "Mobility"),
    Nibss => (6, "NIBSS"),
    NotOnUs => (17, "Not_on_us"),
    PartnerPayment => (5, "Partner Payment"),
    PayDirect => (28, "PAYDirect"),
    PaymentGateway => (8, "Payment_Gateway"),
    PosBranchAcquired => (7, "POS_@Branch_POS_Acquired"),
    PosAcquired => (9, "POS_Acquired"),
    ProductDocuments => (26, "Product Documents"),
    Recharge => (10, "Recharge"),
    RemoteOnUs => (14, "Remote_On_Us"),
    RemotePos => (13, "Remote_POS"),
    RemoteWeb => (16, "Remote_WEB"),
    ResponseCodeAnalysis => (11, "Response_Code_Analysis"),
    Settlement => (30, "Settlement"),
    VerveBilling => (25, "Verve_Billing"),
    VerveInternational => (27, "Verve_International"),
    VerveRate => (29, "Verve_Rate"),
    Visa => (31, "VISA"),
    WebAcquired => (18, "Web_Acquired"),
}

impl ReportType {
    /// Look up a category by its numeric portal code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.code() == code)
    }

    /// Option value to select in the portal dropdown
    pub fn option_value(self) -> String {
        self.code().to_string()
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ReportType {
    type Err = UnknownReportType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        if let Some(found) = Self::ALL.iter().copied().find(|r| r.label() == trimmed) {
            return Ok(found);
        }

        // `_24` is the marker form used by older clients; strip it to get the code
        let code = trimmed.strip_prefix('_').unwrap_or(trimmed);
        code.parse::<u8>()
            .ok()
            .and_then(Self::from_code)
            .or_else(|| {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|r| r.label().eq_ignore_ascii_case(trimmed))
            })
            .ok_or_else(|| UnknownReportType(s.to_string()))
    }
}

impl Serialize for ReportType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ReportType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Follow-up choices offered to the caller when a search returns nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReattemptOption {
    #[serde(rename = "Try another report type")]
    AnotherReportType,
    #[serde(rename = "Try a different date range")]
    DifferentDateRange,
}

impl ReattemptOption {
    pub const ALL: [ReattemptOption; 2] = [
        ReattemptOption::AnotherReportType,
        ReattemptOption::DifferentDateRange,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ReattemptOption::AnotherReportType => "Try another report type",
            ReattemptOption::DifferentDateRange => "Try a different date range",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique() {
        let codes: HashSet<u8> = ReportType::ALL.iter().map(|r| r.code()).collect();
        assert_eq!(codes.len(), ReportType::ALL.len());
        assert_eq!(ReportType::ALL.len(), 31);
    }

    #[rstest]
    #[case("ATM Detail", ReportType::AtmDetail)]
    #[case("24", ReportType::AtmDetail)]
    #[case("_24", ReportType::AtmDetail)]
    #[case("_0", ReportType::AllCategories)]
    #[case("POS_@Branch_POS_Acquired", ReportType::PosBranchAcquired)]
    #[case("visa", ReportType::Visa)]
    fn test_parse_report_type(#[case] raw: &str, #[case] expected: ReportType) {
        assert_eq!(raw.parse::<ReportType>().unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("_99")]
    #[case("Lottery")]
    fn test_reject_unknown_report_type(#[case] raw: &str) {
        assert!(raw.parse::<ReportType>().is_err());
    }

    #[test]
    fn test_option_value_is_numeric_code() {
        assert_eq!(ReportType::Settlement.option_value(), "30");
        assert_eq!(ReportType::from_code(18), Some(ReportType::WebAcquired));
    }

    #[test]
    fn test_serializes_as_label() {
        let json = serde_json::to_string(&ReportType::PartnerPayment).unwrap();
        assert_eq!(json, "\"Partner Payment\"");
        let back: ReportType = serde_json::from_str("\"_5\"").unwrap();
        assert_eq!(back, ReportType::PartnerPayment);
    }
}

//! Tool profiles: the per-report configuration of the shared pipeline.
//!
//! Each built-in profile fixes the schema, keyword sets, threshold and
//! post-processing of one report. Custom profiles can be loaded from JSON
//! with [`load_profile`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::derive::Step;
use crate::detect::{FooterMarker, Threshold};
use crate::error::{Result, ToolError};
use crate::model::{CanonicalColumn, ColumnKind, TargetSchema};
use crate::reconcile::{CollisionPolicy, LabelMatch};

pub const DELAY_ORDER: &str = "delay-order";
pub const GOODS_RECEIPT: &str = "goods-receipt";
pub const LOT_REJECTION: &str = "lot-rejection";
pub const LOSS: &str = "loss";
pub const SCRAP_STOCK: &str = "scrap-stock";

/// Names of the profiles compiled into the binary.
pub const BUILTIN_PROFILES: &[&str] = &[DELAY_ORDER, GOODS_RECEIPT, LOT_REJECTION, LOSS, SCRAP_STOCK];

/// Horizontal alignment of the title rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TitleAlign {
    Left,
    #[default]
    Center,
}

/// Presentation settings consumed by the output composer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub sheet_name: String,
    /// Title row templates, rendered by [`ReportMeta::render`](crate::meta::ReportMeta::render).
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub title_align: TitleAlign,
    /// Background of the first title row, as `0xRRGGBB`.
    #[serde(default)]
    pub title_fill: Option<u32>,
    #[serde(default)]
    pub header_fill: Option<u32>,
    #[serde(default)]
    pub header_font_white: bool,
    /// Fixed widths per canonical column name.
    #[serde(default)]
    pub widths: BTreeMap<String, f64>,
    /// Width for columns missing from `widths`; auto-sized when absent.
    #[serde(default)]
    pub default_width: Option<f64>,
    #[serde(default = "default_max_auto_width")]
    pub max_auto_width: f64,
    #[serde(default)]
    pub header_row_height: Option<f64>,
    #[serde(default)]
    pub body_row_height: Option<f64>,
    #[serde(default)]
    pub footer_row_height: Option<f64>,
    /// Footer highlight; yellow when absent.
    #[serde(default)]
    pub footer_fill: Option<u32>,
    /// Number format for numeric body cells.
    #[serde(default)]
    pub number_format: Option<String>,
    /// Output filename template, rendered like the titles.
    pub file_name: String,
}

fn default_max_auto_width() -> f64 {
    15.0
}

/// Where the report's date range comes from when not given explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    #[default]
    Today,
    /// "From Date" / "To Date" labels above the header.
    HeaderScan,
    /// Earliest and latest date found in a body column.
    ColumnRange(String),
}

/// Report title and date extraction rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetaRules {
    #[serde(default)]
    pub detect_title: bool,
    #[serde(default)]
    pub default_title: String,
    #[serde(default)]
    pub dates: DateSource,
}

/// Complete configuration of one report converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub schema: TargetSchema,
    pub threshold: Threshold,
    #[serde(default)]
    pub label_match: LabelMatch,
    #[serde(default)]
    pub collision: CollisionPolicy,
    #[serde(default)]
    pub footer: FooterMarker,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub meta: MetaRules,
    pub layout: Layout,
}

impl ToolProfile {
    /// Checks that the schema is usable and every step names a declared column.
    pub fn validate(&self) -> Result<()> {
        if !self.schema.columns.iter().any(CanonicalColumn::is_sourced) {
            return Err(ToolError::InvalidProfile(format!(
                "profile '{}' declares no sourced columns",
                self.name
            )));
        }
        for step in &self.steps {
            for column in step.columns() {
                if self.schema.position(column).is_none() {
                    return Err(ToolError::InvalidProfile(format!(
                        "profile '{}' step references unknown column '{column}'",
                        self.name
                    )));
                }
            }
        }
        if let DateSource::ColumnRange(column) = &self.meta.dates {
            if self.schema.position(column).is_none() {
                return Err(ToolError::InvalidProfile(format!(
                    "profile '{}' takes dates from unknown column '{column}'",
                    self.name
                )));
            }
        }
        for column in &self.schema.columns {
            if let ColumnKind::Formula { template, .. } = &column.kind {
                if !template.contains("{row}") {
                    return Err(ToolError::InvalidProfile(format!(
                        "formula for '{}' has no {{row}} placeholder",
                        column.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Reads and validates a profile from a JSON file.
pub fn load_profile(path: &Path) -> Result<ToolProfile> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let source = fs::read_to_string(path)?;
    let profile: ToolProfile = serde_json::from_str(&source)?;
    profile.validate()?;
    Ok(profile)
}

/// Looks up a built-in profile by name.
pub fn builtin(name: &str) -> Result<ToolProfile> {
    match name {
        DELAY_ORDER => Ok(delay_order()),
        GOODS_RECEIPT => Ok(goods_receipt()),
        LOT_REJECTION => Ok(lot_rejection()),
        LOSS => Ok(loss()),
        SCRAP_STOCK => Ok(scrap_stock()),
        other => Err(ToolError::UnknownProfile(other.to_string())),
    }
}

fn widths(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries
        .iter()
        .map(|(column, width)| (column.to_string(), *width))
        .collect()
}

fn delay_order() -> ToolProfile {
    let mut unwanted = vec![String::new()];
    unwanted.extend((1..=9).map(|days| format!("({days}.00)")));

    ToolProfile {
        name: DELAY_ORDER.into(),
        description: "Open delay-order report sorted by overdue days".into(),
        schema: TargetSchema::new(vec![
            CanonicalColumn::with_keywords("Order No", &["order no", "orderno", "order #"]),
            CanonicalColumn::with_keywords("Variant Name", &["variant", "variant name"]),
            CanonicalColumn::with_keywords("Group No", &["group no", "group"]),
            CanonicalColumn::with_keywords("Batch No", &["batch no", "batch"]),
            CanonicalColumn::with_keywords("Actual Metal Wt", &["metal wt", "actual metal"]),
            CanonicalColumn::with_keywords("Dept Name", &["dept", "department"]),
            CanonicalColumn::with_keywords("Jobworker", &["jobworker", "worker"]),
            CanonicalColumn::with_keywords("Req Purity", &["req purity", "purity"]),
            CanonicalColumn::with_keywords("Shipment Date", &["shipment date", "ship date"]),
            CanonicalColumn::with_keywords("Order Date", &["order date", "date"]),
            CanonicalColumn::with_keywords("Shipment Days", &["shipment days", "ship days"]),
            CanonicalColumn::with_keywords("Order Days", &["order days", "days"]),
        ]),
        threshold: Threshold::Half,
        label_match: LabelMatch::Keyword,
        collision: CollisionPolicy::FirstDeclared,
        footer: FooterMarker::Contains("grand total".into()),
        steps: vec![
            Step::ExcludeValues {
                column: "Order Days".into(),
                values: unwanted,
            },
            Step::SortDescending {
                column: "Order Days".into(),
            },
            Step::NormalizeDate {
                column: "Shipment Date".into(),
                format: "%d-%m-%Y".into(),
            },
            Step::NormalizeDate {
                column: "Order Date".into(),
                format: "%d-%m-%Y".into(),
            },
        ],
        meta: MetaRules::default(),
        layout: Layout {
            sheet_name: "Sheet1".into(),
            titles: vec!["DELAY ORDER REPORT".into(), "Status :- OPEN".into()],
            title_align: TitleAlign::Center,
            title_fill: None,
            header_fill: Some(0x0000FF),
            header_font_white: true,
            widths: BTreeMap::new(),
            default_width: Some(15.0),
            max_auto_width: default_max_auto_width(),
            header_row_height: Some(25.0),
            body_row_height: None,
            footer_fill: None,
            footer_row_height: None,
            number_format: None,
            file_name: "Formatted_Delay_Order_Report.xlsx".into(),
        },
    }
}

fn goods_receipt() -> ToolProfile {
    ToolProfile {
        name: GOODS_RECEIPT.into(),
        description: "Goods receipt note / sale invoice register with karat".into(),
        schema: TargetSchema::new(vec![
            CanonicalColumn::named("Trans Date"),
            CanonicalColumn::named("Doc No"),
            CanonicalColumn::named("Party Name"),
            CanonicalColumn::named("Style No"),
            CanonicalColumn::derived("Karat").detectable_by(&["karat"]),
            CanonicalColumn::named("Variant Name"),
            CanonicalColumn::named("Net Wt"),
            CanonicalColumn::named("Wastage Perc"),
            CanonicalColumn::named("Pg Wt"),
            CanonicalColumn::named("Pg Wastage Wt"),
            CanonicalColumn::named("Line Remark"),
        ]),
        threshold: Threshold::Fraction(0.6),
        label_match: LabelMatch::Flexible,
        collision: CollisionPolicy::FirstDeclared,
        footer: FooterMarker::Contains("grand total".into()),
        steps: vec![
            Step::StripTime {
                column: "Trans Date".into(),
            },
            Step::ExtractKarat {
                from: "Style No".into(),
                into: "Karat".into(),
            },
        ],
        meta: MetaRules {
            detect_title: true,
            default_title: "GOODS RECEIPT NOTE".into(),
            dates: DateSource::ColumnRange("Trans Date".into()),
        },
        layout: Layout {
            sheet_name: "Report".into(),
            titles: vec![
                "Trans Type :- {title}".into(),
                "From Date :- {from}   To Date :- {to}".into(),
            ],
            title_align: TitleAlign::Center,
            title_fill: None,
            header_fill: Some(0x366092),
            header_font_white: true,
            widths: widths(&[
                ("Trans Date", 18.5),
                ("Doc No", 15.0),
                ("Party Name", 23.0),
                ("Style No", 20.0),
                ("Karat", 13.0),
                ("Variant Name", 14.0),
                ("Net Wt", 10.0),
                ("Wastage Perc", 8.0),
                ("Pg Wt", 8.0),
                ("Pg Wastage Wt", 10.0),
                ("Line Remark", 20.0),
            ]),
            default_width: None,
            max_auto_width: 15.0,
            header_row_height: None,
            body_row_height: Some(25.0),
            footer_fill: None,
            footer_row_height: Some(25.0),
            number_format: None,
            file_name: "{title}.xlsx".into(),
        },
    }
}

fn lot_rejection() -> ToolProfile {
    ToolProfile {
        name: LOT_REJECTION.into(),
        description: "Lot rejection report".into(),
        schema: TargetSchema::new(vec![
            CanonicalColumn::named("Trans Date"),
            CanonicalColumn::named("Order No"),
            CanonicalColumn::named("Group No"),
            CanonicalColumn::named("Style Name"),
            CanonicalColumn::named("Karat"),
            CanonicalColumn::named("Wt"),
            CanonicalColumn::named("Operation Name"),
            CanonicalColumn::named("Wc Name"),
            CanonicalColumn::named("User Name"),
            CanonicalColumn::named("Remark"),
        ]),
        threshold: Threshold::Fraction(0.6),
        label_match: LabelMatch::Flexible,
        collision: CollisionPolicy::FirstDeclared,
        footer: FooterMarker::Contains("grand total".into()),
        steps: Vec::new(),
        meta: MetaRules {
            detect_title: false,
            default_title: "Lot Rejection Report".into(),
            dates: DateSource::Today,
        },
        layout: Layout {
            sheet_name: "Report".into(),
            titles: vec![
                "{title}".into(),
                "From Date: {from} - To Date: {to}".into(),
            ],
            title_align: TitleAlign::Center,
            title_fill: None,
            header_fill: Some(0x366092),
            header_font_white: true,
            widths: widths(&[("Trans Date", 10.0), ("Style Name", 30.0)]),
            default_width: None,
            max_auto_width: 20.0,
            header_row_height: None,
            body_row_height: Some(25.0),
            footer_fill: None,
            footer_row_height: Some(25.0),
            number_format: None,
            file_name: "Lot_Rejection_Report.xlsx".into(),
        },
    }
}

fn loss() -> ToolProfile {
    ToolProfile {
        name: LOSS.into(),
        description: "Monthly work-centre loss summary with live loss formulas".into(),
        schema: TargetSchema::new(vec![
            CanonicalColumn::named("Wc Name"),
            CanonicalColumn::named("Issue Quantity Pg"),
            CanonicalColumn::named("Process Quantity Pg"),
            CanonicalColumn::named("Unutilized Quantity Pg"),
            CanonicalColumn::named("Unutilized Quantity Sample Pg"),
            CanonicalColumn::named("Unutilized Quantity Scrap Pg"),
            CanonicalColumn::named("Loss Quantity Pg"),
            CanonicalColumn::named("Gain Pg"),
            CanonicalColumn::formula("FINAL LOSS", "=G{row}+H{row}", "0.0000"),
            CanonicalColumn::formula("LOSS %", "=I{row}/(C{row}+D{row}+E{row}+F{row})", "0.00%"),
        ]),
        threshold: Threshold::Fraction(0.5),
        label_match: LabelMatch::Compact,
        collision: CollisionPolicy::FirstDeclared,
        footer: FooterMarker::FirstCellStartsWith("total".into()),
        steps: vec![Step::RoundNumbers { digits: 4 }],
        meta: MetaRules {
            detect_title: false,
            default_title: "Monthly Loss Report Summary".into(),
            dates: DateSource::HeaderScan,
        },
        layout: Layout {
            sheet_name: "Formatted Loss Report".into(),
            titles: vec![
                "{title}".into(),
                "From Date :- {from}".into(),
                "To Date :- {to}".into(),
            ],
            title_align: TitleAlign::Left,
            title_fill: Some(0x0000FF),
            header_fill: Some(0xADD8E6),
            header_font_white: false,
            widths: widths(&[
                ("Wc Name", 30.0),
                ("Issue Quantity Pg", 12.0),
                ("Process Quantity Pg", 14.0),
                ("Unutilized Quantity Pg", 11.5),
                ("Unutilized Quantity Sample Pg", 17.3),
                ("Unutilized Quantity Scrap Pg", 17.3),
                ("Loss Quantity Pg", 11.5),
                ("Gain Pg", 11.5),
                ("FINAL LOSS", 11.5),
                ("LOSS %", 11.5),
            ]),
            default_width: Some(12.0),
            max_auto_width: default_max_auto_width(),
            header_row_height: Some(37.5),
            body_row_height: None,
            footer_fill: None,
            footer_row_height: Some(23.0),
            number_format: Some("0.0000".into()),
            file_name: "loss_report_{ymd}.xlsx".into(),
        },
    }
}

fn scrap_stock() -> ToolProfile {
    ToolProfile {
        name: SCRAP_STOCK.into(),
        description: "Scrap stock status by work-centre group".into(),
        schema: TargetSchema::new(vec![
            CanonicalColumn::named("Wcgroup Name"),
            CanonicalColumn::named("Wc Name"),
            CanonicalColumn::named("State"),
            CanonicalColumn::named("Karat Code"),
            CanonicalColumn::named("Weight"),
            CanonicalColumn::named("Pg Weight"),
        ]),
        threshold: Threshold::All,
        label_match: LabelMatch::Keyword,
        collision: CollisionPolicy::LongestFragment,
        footer: FooterMarker::FirstCellStartsWith("total".into()),
        steps: Vec::new(),
        meta: MetaRules::default(),
        layout: Layout {
            sheet_name: "Formatted".into(),
            titles: vec!["Stock Status :- Scrap _ Date : {date}  Time : {time}".into()],
            title_align: TitleAlign::Center,
            title_fill: Some(0x4F81BD),
            header_fill: None,
            header_font_white: false,
            widths: widths(&[("Wcgroup Name", 24.0), ("Wc Name", 24.0)]),
            default_width: None,
            max_auto_width: 15.0,
            header_row_height: None,
            body_row_height: None,
            footer_fill: None,
            footer_row_height: Some(35.0),
            number_format: None,
            file_name: "Formatted_Stock.xlsx".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_profile_is_valid() {
        for name in BUILTIN_PROFILES {
            let profile = builtin(name).expect("built-in profile");
            assert_eq!(&profile.name, name);
            profile.validate().expect("profile validates");
        }
    }

    #[test]
    fn unknown_profiles_are_rejected() {
        assert!(matches!(builtin("payroll"), Err(ToolError::UnknownProfile(_))));
    }

    #[test]
    fn delay_order_excludes_single_digit_days() {
        let profile = builtin(DELAY_ORDER).expect("built-in profile");
        let Step::ExcludeValues { values, .. } = &profile.steps[0] else {
            panic!("first step excludes values");
        };
        assert_eq!(values.len(), 10);
        assert!(values.contains(&"(9.00)".to_string()));
        assert!(!values.contains(&"(10.00)".to_string()));
    }

    #[test]
    fn profiles_round_trip_through_json() {
        let profile = builtin(DELAY_ORDER).expect("built-in profile");
        let json = serde_json::to_string(&profile).expect("serialised");
        let restored: ToolProfile = serde_json::from_str(&json).expect("deserialised");
        assert_eq!(profile, restored);

        let schema = builtin(LOSS).expect("built-in profile").schema;
        let json = serde_json::to_string(&schema).expect("serialised");
        let restored: TargetSchema = serde_json::from_str(&json).expect("deserialised");
        assert_eq!(schema, restored);
    }

    #[test]
    fn custom_profile_needs_known_step_columns() {
        let json = serde_json::json!({
            "name": "custom",
            "schema": [{"name": "Party Name"}],
            "threshold": {"fraction": 0.5},
            "steps": [{"step": "strip_time", "column": "Trans Date"}],
            "layout": {"sheet_name": "Report", "file_name": "custom.xlsx"}
        });
        let profile: ToolProfile = serde_json::from_value(json).expect("deserialised");
        assert!(matches!(profile.validate(), Err(ToolError::InvalidProfile(_))));
    }
}

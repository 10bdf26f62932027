//! Closed table of the 16 border-presence styles.

use rust_xlsxwriter::Format;

use crate::conf::N_BORDER_STYLE_KEYS;
use crate::spec::{SpecBorderStyleKey, SpecCellFormat};
use crate::util::derive_rust_xlsx_format;

/// Pre-built formats for every top/bottom/left/right combination.
///
/// Built eagerly from one base format; lookups never allocate and never
/// fail. Each entry has a bold twin so emphasis composes with borders.
#[derive(Debug, Clone, PartialEq)]
pub struct BorderStyleCache {
    l_fmt_plain: [Format; N_BORDER_STYLE_KEYS],
    l_fmt_bold: [Format; N_BORDER_STYLE_KEYS],
}

impl BorderStyleCache {
    /// Build all 32 formats over `fmt_base`.
    pub fn new(fmt_base: &SpecCellFormat) -> Self {
        let fmt_bold = fmt_base.with_(SpecCellFormat {
            bold: Some(true),
            ..Default::default()
        });
        Self {
            l_fmt_plain: std::array::from_fn(|n_idx| derive_keyed_format(fmt_base, n_idx)),
            l_fmt_bold: std::array::from_fn(|n_idx| derive_keyed_format(&fmt_bold, n_idx)),
        }
    }

    /// Format for `key` over the base format.
    pub fn get(&self, key: SpecBorderStyleKey) -> &Format {
        &self.l_fmt_plain[key.index()]
    }

    /// Format for `key`, bold when `if_bold` is set.
    pub fn get_with_bold(&self, key: SpecBorderStyleKey, if_bold: bool) -> &Format {
        if if_bold {
            &self.l_fmt_bold[key.index()]
        } else {
            &self.l_fmt_plain[key.index()]
        }
    }
}

fn derive_keyed_format(fmt_base: &SpecCellFormat, n_idx: usize) -> Format {
    // n_idx < 16, so the cast keeps every bit
    let border = SpecBorderStyleKey::from_bits(n_idx as u8).to_border();
    derive_rust_xlsx_format(&fmt_base.with_(SpecCellFormat {
        top: Some(border.top),
        bottom: Some(border.bottom),
        left: Some(border.left),
        right: Some(border.right),
        ..Default::default()
    }))
}

//! ブレークポイント管理

use std::collections::BTreeMap;
use tsunagi_mi::{field_str, opt_field_parse, opt_field_str, Tuple, Value, ValueError};

/// ブレークポイント番号
pub type BreakpointId = u32;

/// ブレークポイントの実体位置
///
/// テンプレートやオーバーロードでは1つのブレークポイントが複数の位置を持ちます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointLocation {
    /// `1.2` のような位置番号
    pub number: String,
    pub enabled: bool,
    pub addr: Option<String>,
    pub func: Option<String>,
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
}

impl BreakpointLocation {
    fn from_tuple(tuple: &Tuple) -> Result<Self, ValueError> {
        Ok(Self {
            number: field_str(tuple, "number")?.to_string(),
            enabled: opt_field_str(tuple, "enabled") != Some("n"),
            addr: opt_field_str(tuple, "addr").map(str::to_string),
            func: opt_field_str(tuple, "func").map(str::to_string),
            file: opt_field_str(tuple, "file").map(str::to_string),
            fullname: opt_field_str(tuple, "fullname").map(str::to_string),
            line: opt_field_parse(tuple, "line")?,
        })
    }
}

/// ブレークポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub enabled: bool,
    /// `<MULTIPLE>` は複数位置
    pub addr: Option<String>,
    pub func: Option<String>,
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
    pub original_location: Option<String>,
    pub hit_count: u32,
    /// 複数位置の場合の各位置
    pub locations: Vec<BreakpointLocation>,
}

impl Breakpoint {
    /// `bkpt` の値から変換する
    ///
    /// 複数位置の報告は2つの形があります。
    /// - 旧形式: `bkpt={...},{number="1.1",...},{...}`（集約後は配列）
    /// - 新形式: `bkpt={...,locations=[{...},{...}]}`
    pub fn from_value(value: &Value) -> Result<Self, ValueError> {
        let items = value.items();
        let (head, rest) = items.split_first().ok_or(ValueError::Shape {
            expected: "tuple",
            found: "empty list",
        })?;
        let tuple = head.expect_tuple()?;

        let number = field_str(tuple, "number")?;
        let id = number.parse().map_err(|_| ValueError::Invalid {
            field: "number".to_string(),
            value: number.to_string(),
        })?;

        let location_values: &[Value] = match tuple.get("locations") {
            Some(locations) => locations.items(),
            None => rest,
        };
        let locations = location_values
            .iter()
            .map(|v| v.expect_tuple().and_then(BreakpointLocation::from_tuple))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id,
            enabled: opt_field_str(tuple, "enabled") != Some("n"),
            addr: opt_field_str(tuple, "addr").map(str::to_string),
            func: opt_field_str(tuple, "func").map(str::to_string),
            file: opt_field_str(tuple, "file").map(str::to_string),
            fullname: opt_field_str(tuple, "fullname").map(str::to_string),
            line: opt_field_parse(tuple, "line")?,
            original_location: opt_field_str(tuple, "original-location").map(str::to_string),
            hit_count: opt_field_parse(tuple, "times")?.unwrap_or(0),
            locations,
        })
    }
}

/// ブレークポイント一覧
///
/// デバッガが報告したブレークポイントを番号順に保持します。
pub struct BreakpointTable {
    breakpoints: BTreeMap<BreakpointId, Breakpoint>,
}

impl BreakpointTable {
    /// 空の一覧を作成する
    pub fn new() -> Self {
        Self {
            breakpoints: BTreeMap::new(),
        }
    }

    /// ブレークポイントを追加する（同じ番号なら置き換える）
    pub fn insert(&mut self, breakpoint: Breakpoint) {
        self.breakpoints.insert(breakpoint.id, breakpoint);
    }

    /// ブレークポイントを削除する
    pub fn remove(&mut self, id: BreakpointId) -> Option<Breakpoint> {
        self.breakpoints.remove(&id)
    }

    /// 有効・無効を切り替える
    pub fn set_enabled(&mut self, id: BreakpointId, enabled: bool) {
        if let Some(bp) = self.breakpoints.get_mut(&id) {
            bp.enabled = enabled;
        }
    }

    /// ブレークポイントを取得する
    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    /// 全てのブレークポイントを取得する
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    /// ブレークポイントの数を取得する
    pub fn count(&self) -> usize {
        self.breakpoints.len()
    }
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self::new()
    }
}

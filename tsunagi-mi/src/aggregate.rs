//! 結果列の集約
//!
//! 出現順の `(name?, value)` 列を名前→値のマッピングに畳み込みます。
//!
//! - 同じ名前が繰り返されたら、出現順に配列へ積む
//! - 名前なしの値は直前の名前付き結果の続きとみなし、その名前の配列へ積む
//!   （複数ロケーションのブレークポイント報告 `bkpt={...},{...},{...}` の形）
//!
//! 最初に積むとき、既存の値は1要素の配列に昇格します。
//! 既存の値がリストでも包み直すので、`x=["a"],x=["b"]` は `[["a"],["b"]]` になります。

use crate::error::ParseError;
use crate::grammar::{RawBody, RawItem, RawValue};
use crate::record::Payload;
use crate::value::{Tuple, Value};
use std::collections::btree_map::Entry;
use std::collections::HashSet;

/// レコード本体をペイロードに変換する
pub fn payload(body: RawBody) -> Result<Payload, ParseError> {
    Ok(match body {
        RawBody::Results(items) => Payload::Results(aggregate(items)?),
        RawBody::Stream(text) => Payload::Stream(text),
        RawBody::Async { class, items } => Payload::Async {
            class,
            results: aggregate(items)?,
        },
    })
}

/// 結果列を集約する
pub fn aggregate(items: Vec<RawItem>) -> Result<Tuple, ParseError> {
    let mut out = Tuple::new();
    // 配列に昇格済みの名前
    let mut promoted: HashSet<String> = HashSet::new();
    let mut last_name: Option<String> = None;

    for item in items {
        let name = match item.name {
            Some(name) => name,
            None => last_name
                .clone()
                .ok_or(ParseError::OrphanValue { offset: item.offset })?,
        };
        let value = convert(item.value)?;

        match out.entry(name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => {
                if promoted.contains(&name) {
                    if let Value::List(items) = slot.get_mut() {
                        items.push(value);
                    }
                } else {
                    let first = std::mem::replace(slot.get_mut(), Value::List(Vec::new()));
                    *slot.get_mut() = Value::List(vec![first, value]);
                    promoted.insert(name.clone());
                }
            }
        }

        last_name = Some(name);
    }

    Ok(out)
}

/// 集約前の値を変換する
///
/// 名前なし値だけのリストはリストのまま、名前付き結果を含むリストは
/// タプルに集約する（`locals=[name="A",name="B"]` → `{name=["A","B"]}`）。
pub fn convert(value: RawValue) -> Result<Value, ParseError> {
    match value {
        RawValue::Const(text) => Ok(Value::String(text)),
        RawValue::Tuple(items) => Ok(Value::Tuple(aggregate(items)?)),
        RawValue::List(items) => {
            if items.iter().all(|item| item.name.is_none()) {
                let values = items
                    .into_iter()
                    .map(|item| convert(item.value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            } else {
                Ok(Value::Tuple(aggregate(items)?))
            }
        }
    }
}

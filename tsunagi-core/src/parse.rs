//! アドレス表記の解釈

use std::num::ParseIntError;

/// アドレス文字列を u64 にする
///
/// MI が返す `0x` 付き16進数と、REPL で打たれる10進数を受け付けます。
/// GDB が値に付ける型の前置き `(int *) ` とシンボル注記 ` <main+4>` は読み飛ばします。
///
/// # Examples
/// ```
/// use tsunagi_core::parse::parse_address;
///
/// assert_eq!(parse_address("0x0000000000601040").unwrap(), 0x601040);
/// assert_eq!(parse_address("(int (*)[4]) 0x7ffe0010").unwrap(), 0x7ffe0010);
/// assert_eq!(parse_address("4096").unwrap(), 4096);
/// ```
pub fn parse_address(s: &str) -> Result<u64, ParseIntError> {
    let mut s = s.trim();
    if let Some(close) = type_prefix_end(s) {
        s = s[close + 1..].trim_start();
    }
    let s = s.split_whitespace().next().unwrap_or("");

    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

/// 先頭の `(型)` の閉じ括弧の位置
fn type_prefix_end(s: &str) -> Option<usize> {
    if !s.starts_with('(') {
        return None;
    }
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mi_addresses() {
        assert_eq!(parse_address("0x0000000000400a10"), Ok(0x400a10));
        assert_eq!(parse_address("0X7FFE"), Ok(0x7ffe));
        assert_eq!(parse_address(" 1234 "), Ok(1234));
    }

    #[test]
    fn test_gdb_value_annotations() {
        assert_eq!(parse_address("0x400a10 <main+4>"), Ok(0x400a10));
        assert_eq!(parse_address("(char *) 0x4006f4 \"a) b\""), Ok(0x4006f4));
        assert_eq!(parse_address("(int (*)[4]) 0x7fffffffe0f0"), Ok(0x7fffffffe0f0));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(parse_address("").is_err());
        assert!(parse_address("0xghij").is_err());
        assert!(parse_address("<unavailable>").is_err());
        // 接頭辞のない16進数は10進数として読むので失敗する
        assert!(parse_address("7ffe").is_err());
    }
}

/// Parse a resource quantity (`100m`, `1.5`, `128Mi`, `1e3`) into base units
pub fn parse_quantity(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    const BINARY: [(&str, f64); 6] = [
        ("Ki", 1024.0),
        ("Mi", 1_048_576.0),
        ("Gi", 1_073_741_824.0),
        ("Ti", 1_099_511_627_776.0),
        ("Pi", 1_125_899_906_842_624.0),
        ("Ei", 1_152_921_504_606_846_976.0),
    ];
    const DECIMAL: [(&str, f64); 9] = [
        ("n", 1e-9),
        ("u", 1e-6),
        ("m", 1e-3),
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
    ];

    for (suffix, factor) in BINARY.iter().chain(DECIMAL.iter()) {
        if let Some(number) = raw.strip_suffix(suffix) {
            // "1E3" is an exponent, not exa
            if *suffix == "E" && number.is_empty() {
                return None;
            }
            return number.parse::<f64>().ok().map(|n| n * factor);
        }
    }

    raw.parse::<f64>().ok()
}

/// CPU quantity in millicores
pub(crate) fn millicores(raw: &str) -> Option<i64> {
    parse_quantity(raw).map(|cores| (cores * 1000.0).round() as i64)
}

/// Memory quantity in bytes
pub(crate) fn bytes(raw: &str) -> Option<i64> {
    parse_quantity(raw).map(|b| b.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_quantities() {
        assert_eq!(millicores("100m"), Some(100));
        assert_eq!(millicores("1"), Some(1000));
        assert_eq!(millicores("0.25"), Some(250));
    }

    #[test]
    fn test_memory_quantities() {
        assert_eq!(bytes("100Mi"), Some(104_857_600));
        assert_eq!(bytes("1G"), Some(1_000_000_000));
        assert_eq!(bytes("129e6"), Some(129_000_000));
        assert_eq!(bytes("128974848"), Some(128_974_848));
    }

    #[test]
    fn test_invalid_quantities() {
        assert_eq!(parse_quantity(""), None);
        assert_eq!(parse_quantity("lots"), None);
        assert_eq!(parse_quantity("Mi"), None);
    }
}

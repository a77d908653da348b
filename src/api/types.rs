use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Upstreams send numbers both as JSON numbers and as decimal strings.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number))
}

pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Buy/sell counters over one window.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxnCounts {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub buys: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sells: Option<f64>,
}

impl TxnCounts {
    pub fn total(&self) -> u64 {
        let total = self.buys.unwrap_or_default() + self.sells.unwrap_or_default();
        total.max(0.0) as u64
    }
}

pub fn non_negative(value: Option<f64>) -> f64 {
    value.unwrap_or_default().max(0.0)
}

/// Picks the listing with the deepest liquidity, keeping the first on ties.
pub fn deepest<T, F>(items: Vec<T>, liquidity: F) -> Option<T>
where
    F: Fn(&T) -> f64,
{
    items.into_iter().fold(None, |best, item| match best {
        Some(current) if liquidity(&current) >= liquidity(&item) => Some(current),
        _ => Some(item),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "lenient_f64")]
        value: Option<f64>,
    }

    #[test]
    fn test_lenient_numbers() {
        let parse = |v: Value| serde_json::from_value::<Sample>(v).unwrap().value;
        assert_eq!(parse(json!({"value": 1.5})), Some(1.5));
        assert_eq!(parse(json!({"value": "0.000123"})), Some(0.000123));
        assert_eq!(parse(json!({"value": "n/a"})), None);
        assert_eq!(parse(json!({"value": null})), None);
        assert_eq!(parse(json!({})), None);
    }

    #[test]
    fn test_txn_total() {
        let counts: TxnCounts = serde_json::from_value(json!({"buys": 10, "sells": "5"})).unwrap();
        assert_eq!(counts.total(), 15);
    }

    #[test]
    fn test_deepest_keeps_first_on_tie() {
        let picked = deepest(vec![("a", 5.0), ("b", 9.0), ("c", 9.0)], |x| x.1);
        assert_eq!(picked.map(|x| x.0), Some("b"));
        assert!(deepest(Vec::<(&str, f64)>::new(), |x| x.1).is_none());
    }
}

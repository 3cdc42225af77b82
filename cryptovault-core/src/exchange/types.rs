//! Wire types for the exchange REST responses.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `GET /exchangeInfo` (only the fields the pipeline reads).
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub base_asset: String,
    #[serde(default)]
    pub quote_asset: String,
}

impl SymbolInfo {
    pub fn is_trading(&self) -> bool {
        self.status == "TRADING"
    }
}

/// One entry of `GET /ticker/24hr`.
///
/// Numeric fields arrive as strings; anything absent or unparsable becomes `None`.
/// The quote volume is read from `quoteVolume`, falling back to
/// `quoteAssetVolume` when the former is missing.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "TickerWire")]
pub struct Ticker24h {
    pub symbol: String,
    pub last_price: Option<f64>,
    pub quote_volume: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerWire {
    symbol: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    last_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    quote_volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    quote_asset_volume: Option<f64>,
}

impl From<TickerWire> for Ticker24h {
    fn from(wire: TickerWire) -> Self {
        Self {
            symbol: wire.symbol,
            last_price: wire.last_price,
            quote_volume: wire.quote_volume.or(wire.quote_asset_volume),
        }
    }
}

/// One kline array from `GET /klines`.
///
/// Layout: `[open_time, open, high, low, close, volume, close_time,
/// quote_asset_volume, number_of_trades, taker_base, taker_quote, ignore]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<Value>")]
pub struct RawKline {
    pub open_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub quote_volume: f64,
    pub number_of_trades: u64,
}

impl TryFrom<Vec<Value>> for RawKline {
    type Error = String;

    fn try_from(fields: Vec<Value>) -> Result<Self, Self::Error> {
        if fields.len() < 9 {
            return Err(format!("kline has {} fields, expected at least 9", fields.len()));
        }
        let num = |i: usize, name: &str| {
            number_from_value(&fields[i]).ok_or_else(|| format!("kline field {name} is not numeric"))
        };
        Ok(Self {
            open_time_ms: fields[0]
                .as_i64()
                .ok_or_else(|| "kline open time is not an integer".to_string())?,
            open: num(1, "open")?,
            high: num(2, "high")?,
            low: num(3, "low")?,
            close: num(4, "close")?,
            quote_volume: num(7, "quote_asset_volume")?,
            number_of_trades: fields[8]
                .as_u64()
                .ok_or_else(|| "kline trade count is not an integer".to_string())?,
        })
    }
}

/// Accepts JSON numbers and numeric strings.
pub fn number_from_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binance_kline_array() {
        let json = r#"[1704412800000,"44151.10","44357.46","42450.00","44145.11",
            "48038.06334","1704499199999","2114000000.5",1890421,"24001.1","1056000000.2","0"]"#;
        let k: RawKline = serde_json::from_str(json).unwrap();
        assert_eq!(k.open_time_ms, 1_704_412_800_000);
        assert_eq!(k.open, 44_151.10);
        assert_eq!(k.close, 44_145.11);
        assert_eq!(k.quote_volume, 2_114_000_000.5);
        assert_eq!(k.number_of_trades, 1_890_421);
    }

    #[test]
    fn rejects_short_kline() {
        let res: Result<RawKline, _> = serde_json::from_str(r#"[1704412800000,"1","2"]"#);
        assert!(res.is_err());
    }

    #[test]
    fn rejects_non_numeric_price() {
        let json = r#"[1704412800000,"abc","2","0.5","1","10",0,"10",5,"0","0","0"]"#;
        let res: Result<RawKline, _> = serde_json::from_str(json);
        assert!(res.is_err());
    }

    #[test]
    fn ticker_price_is_lenient() {
        let t: Vec<Ticker24h> = serde_json::from_str(
            r#"[
                {"symbol":"A","lastPrice":"1.5","quoteVolume":"100"},
                {"symbol":"B","lastPrice":"n/a"},
                {"symbol":"C","lastPrice":null,"quoteAssetVolume":"7"},
                {"symbol":"D","lastPrice":2.0}
            ]"#,
        )
        .unwrap();
        assert_eq!(t[0].last_price, Some(1.5));
        assert_eq!(t[0].quote_volume, Some(100.0));
        assert_eq!(t[1].last_price, None);
        assert_eq!(t[1].quote_volume, None);
        assert_eq!(t[2].last_price, None);
        assert_eq!(t[2].quote_volume, Some(7.0));
        assert_eq!(t[3].last_price, Some(2.0));
    }

    #[test]
    fn ticker_accepts_both_volume_keys() {
        let t: Vec<Ticker24h> = serde_json::from_str(
            r#"[
                {"symbol":"A","lastPrice":"1","quoteVolume":"5","quoteAssetVolume":"9"},
                {"symbol":"B","lastPrice":"1","quoteVolume":"bad","quoteAssetVolume":"9"},
                {"symbol":"C","lastPrice":"1","quoteAssetVolume":"3"}
            ]"#,
        )
        .unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t[0].quote_volume, Some(5.0));
        assert_eq!(t[1].quote_volume, Some(9.0));
        assert_eq!(t[2].quote_volume, Some(3.0));
    }

    #[test]
    fn symbol_info_tolerates_missing_fields() {
        let info: ExchangeInfo = serde_json::from_str(
            r#"{"timezone":"UTC","symbols":[{"symbol":"ETHBTC","status":"BREAK"},
               {"symbol":"BTCUSDT","status":"TRADING","baseAsset":"BTC","quoteAsset":"USDT"}]}"#,
        )
        .unwrap();
        assert!(!info.symbols[0].is_trading());
        assert_eq!(info.symbols[0].quote_asset, "");
        assert!(info.symbols[1].is_trading());
    }
}

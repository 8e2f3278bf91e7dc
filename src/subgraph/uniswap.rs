//! Uniswap V3 subgraph queries for daily pool prices.

use anyhow::{anyhow, Context, Result};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;

use crate::history::PricePoint;

use super::client::SubgraphClient;

/// Maximum records the subgraph returns per query.
pub const PAGE_SIZE: usize = 1000;

const POOL_DAY_DATAS_QUERY: &str = r#"
query PoolDayDatas($pool: String!, $since: Int!, $first: Int!) {
  poolDayDatas(first: $first, orderBy: date, orderDirection: asc, where: { pool: $pool, date_gt: $since }) {
    date
    token0Price
    token1Price
  }
}
"#;

const LATEST_POOL_DAY_DATA_QUERY: &str = r#"
query LatestPoolDayData($pool: String!, $before: Int!) {
  poolDayDatas(first: 1, orderBy: date, orderDirection: desc, where: { pool: $pool, date_lte: $before }) {
    date
    token0Price
    token1Price
  }
}
"#;

/// A `PoolDayData` entity. Prices are decimal strings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolDayData {
    pub date: i64,
    pub token0_price: String,
    pub token1_price: String,
}

impl PoolDayData {
    /// Price point keyed by day, priced in `token0Price`.
    pub fn to_price_point(&self) -> Result<PricePoint> {
        let date = DateTime::from_timestamp(self.date, 0)
            .ok_or_else(|| anyhow!("Invalid day timestamp {}", self.date))?;
        let price: f64 = self
            .token0_price
            .parse()
            .with_context(|| format!("Invalid token0Price '{}'", self.token0_price))?;
        Ok(PricePoint::new(date, price))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolDayDatas {
    pool_day_datas: Vec<PoolDayData>,
}

/// Uniswap V3 queries over a subgraph client.
pub struct UniswapV3<'a> {
    client: &'a SubgraphClient,
}

impl<'a> UniswapV3<'a> {
    pub fn new(client: &'a SubgraphClient) -> Self {
        Self { client }
    }

    /// All daily observations strictly after `since`, oldest first.
    ///
    /// Pages forward by the last seen day until a short page is returned.
    pub async fn pool_history(&self, pool: &str, since: i64) -> Result<Vec<PricePoint>> {
        let pool = pool.to_lowercase();
        let mut cursor = since;
        let mut points = Vec::new();

        loop {
            let page: PoolDayDatas = self
                .client
                .query(
                    POOL_DAY_DATAS_QUERY,
                    json!({ "pool": pool, "since": cursor, "first": PAGE_SIZE }),
                )
                .await?;

            let page_len = page.pool_day_datas.len();
            for day in &page.pool_day_datas {
                points.push(day.to_price_point()?);
            }

            match page.pool_day_datas.last() {
                Some(last) if page_len >= PAGE_SIZE && last.date > cursor => cursor = last.date,
                _ => break,
            }
        }

        Ok(points)
    }

    /// The most recent daily observation dated at or before `before`.
    pub async fn latest_observation(&self, pool: &str, before: i64) -> Result<Option<PricePoint>> {
        let page: PoolDayDatas = self
            .client
            .query(
                LATEST_POOL_DAY_DATA_QUERY,
                json!({ "pool": pool.to_lowercase(), "before": before }),
            )
            .await?;

        page.pool_day_datas
            .first()
            .map(PoolDayData::to_price_point)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subgraph::testing::ScriptedTransport;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    const DAY: i64 = 86_400;
    const START: i64 = 1_620_000_000;

    fn page(first_date: i64, len: usize) -> Value {
        let days: Vec<Value> = (0..len as i64)
            .map(|i| {
                json!({
                    "date": first_date + i * DAY,
                    "token0Price": format!("{}", 100 + i),
                    "token1Price": "0.01"
                })
            })
            .collect();
        json!({ "data": { "poolDayDatas": days } })
    }

    #[test]
    fn test_decode_pool_day_datas() {
        let page: PoolDayDatas = serde_json::from_str(
            r#"{
                "poolDayDatas": [
                    { "date": 1620172800, "token0Price": "3412.5481", "token1Price": "0.000293" },
                    { "date": 1620259200, "token0Price": "3490", "token1Price": "0.000286" }
                ]
            }"#,
        )
        .unwrap();

        let points: Vec<PricePoint> = page
            .pool_day_datas
            .iter()
            .map(|d| d.to_price_point().unwrap())
            .collect();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, Utc.with_ymd_and_hms(2021, 5, 5, 0, 0, 0).unwrap());
        assert_eq!(points[0].price, 3412.5481);
        assert_eq!(points[1].price, 3490.0);
    }

    #[test]
    fn test_invalid_price_is_rejected() {
        let day = PoolDayData {
            date: 1620172800,
            token0_price: "n/a".to_string(),
            token1_price: "0".to_string(),
        };
        assert!(day.to_price_point().is_err());
    }

    #[tokio::test]
    async fn test_full_page_is_followed_by_next_page() {
        let second_start = START + PAGE_SIZE as i64 * DAY;
        let transport = ScriptedTransport::new(vec![
            Ok(page(START + DAY, PAGE_SIZE)),
            Ok(page(second_start + DAY, 3)),
        ]);
        let client = SubgraphClient::new(transport.clone(), "https://example.com/uniswap");

        let points = UniswapV3::new(&client)
            .pool_history("0xABC", START)
            .await
            .unwrap();

        assert_eq!(points.len(), PAGE_SIZE + 3);
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].1["variables"]["since"], START);
        assert_eq!(requests[0].1["variables"]["first"], PAGE_SIZE);
        assert_eq!(requests[0].1["variables"]["pool"], "0xabc");
        assert_eq!(requests[1].1["variables"]["since"], second_start);
    }

    #[tokio::test]
    async fn test_full_page_without_progress_stops() {
        let stuck: Vec<Value> = (0..PAGE_SIZE)
            .map(|_| json!({ "date": START, "token0Price": "1", "token1Price": "1" }))
            .collect();
        let transport = ScriptedTransport::new(vec![Ok(
            json!({ "data": { "poolDayDatas": stuck } }),
        )]);
        let client = SubgraphClient::new(transport.clone(), "https://example.com/uniswap");

        let points = UniswapV3::new(&client)
            .pool_history("0xabc", START)
            .await
            .unwrap();

        assert_eq!(points.len(), PAGE_SIZE);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_latest_observation_is_bounded_by_cutoff() {
        let cutoff = START + 10 * DAY;
        let transport = ScriptedTransport::new(vec![Ok(page(cutoff - DAY, 1))]);
        let client = SubgraphClient::new(transport.clone(), "https://example.com/uniswap");

        let latest = UniswapV3::new(&client)
            .latest_observation("0xABC", cutoff)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(latest.price, 100.0);
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1["variables"]["before"], cutoff);
        assert_eq!(requests[0].1["variables"]["pool"], "0xabc");
        let query = requests[0].1["query"].as_str().unwrap();
        assert!(query.contains("date_lte: $before"));
        assert!(query.contains("orderDirection: desc"));
    }
}

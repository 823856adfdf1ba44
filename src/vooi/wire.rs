// =============================================================================
// Vooi wire format — JSON bodies to domain types
// =============================================================================
//
// The endpoint mixes numbers and numeric strings freely (`openRate`, `price`,
// ids), so every numeric field goes through `parse_f64` / `id_string`.
// =============================================================================

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::autotrade::{AutotradeClaim, AutotradeSession, AutotradeStatus};
use crate::error::GatewayError;
use crate::position::{CloseReceipt, Direction, InstrumentId, Position};
use crate::quests::{Quest, QuestStatus};
use crate::tapping::TappingSession;
use crate::types::Reward;

/// Pair ids the rates endpoint understands.
const PAIRS: [(u32, &str); 3] = [(1, "BTCUSD"), (2, "ETHUSD"), (3, "TONUSD")];

/// Ticker for a pair id, `None` when the pair is unknown.
pub fn pair_ticker(instrument: InstrumentId) -> Option<&'static str> {
    PAIRS
        .iter()
        .find(|(id, _)| *id == instrument.0)
        .map(|(_, ticker)| *ticker)
}

fn malformed(what: &str, body: &Value) -> GatewayError {
    GatewayError::Malformed(format!("{what}: {body}"))
}

/// Parse a JSON value that may be either a string or a number into `f64`.
pub fn parse_f64(val: &Value) -> Option<f64> {
    if let Some(s) = val.as_str() {
        s.trim().parse::<f64>().ok()
    } else {
        val.as_f64()
    }
}

/// Ids arrive as numbers or strings; normalise to a string.
pub fn id_string(val: &Value) -> Option<String> {
    match val {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_time(val: &Value) -> Option<DateTime<Utc>> {
    val.as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// GET /trades/positions → `{count, nodes: [...]}`.
pub fn parse_positions(body: &Value) -> Result<Vec<Position>, GatewayError> {
    let nodes = match body.get("nodes") {
        Some(Value::Array(nodes)) => nodes,
        Some(Value::Null) | None if body.get("count").and_then(Value::as_u64) == Some(0) => {
            return Ok(Vec::new())
        }
        _ => return Err(malformed("positions response missing 'nodes'", body)),
    };

    nodes.iter().map(parse_position).collect()
}

fn parse_position(node: &Value) -> Result<Position, GatewayError> {
    let id = id_string(&node["id"]).ok_or_else(|| malformed("position without id", node))?;
    let pair = node["pairId"]
        .as_u64()
        .or_else(|| node["pairId"].as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| malformed("position without pairId", node))?;
    let instrument = InstrumentId(
        u32::try_from(pair).map_err(|_| malformed("pairId out of range", node))?,
    );
    let open_rate =
        parse_f64(&node["openRate"]).ok_or_else(|| malformed("position without openRate", node))?;
    let direction = Direction::parse(node["type"].as_str().unwrap_or_default());
    let opened_at =
        parse_time(&node["openDate"]).ok_or_else(|| malformed("position without openDate", node))?;

    Ok(Position {
        id,
        instrument,
        open_rate,
        direction,
        opened_at,
    })
}

/// GET /rates/0?pairId=N → price of the last node.
pub fn parse_latest_price(body: &Value) -> Result<f64, GatewayError> {
    body["nodes"]
        .as_array()
        .and_then(|nodes| nodes.last())
        .and_then(|node| parse_f64(&node["price"]))
        .ok_or_else(|| malformed("rates response without a price", body))
}

/// PATCH /trades/close/{id} → `{vt, pnl}`.
pub fn parse_close(body: &Value) -> Result<CloseReceipt, GatewayError> {
    let reward_vt = parse_f64(&body["vt"]).ok_or_else(|| malformed("close response without vt", body))?;
    let pnl = parse_f64(&body["pnl"]).ok_or_else(|| malformed("close response without pnl", body))?;
    Ok(CloseReceipt { reward_vt, pnl })
}

/// GET /autotrade or POST /autotrade/start. `null` / `{}` means no session.
pub fn parse_autotrade(body: &Value) -> Result<Option<AutotradeSession>, GatewayError> {
    match body {
        Value::Null => return Ok(None),
        Value::Object(map) if map.is_empty() => return Ok(None),
        _ => {}
    }

    let auto_trade_id = id_string(&body["autoTradeId"])
        .ok_or_else(|| malformed("autotrade without autoTradeId", body))?;
    let status = AutotradeStatus::parse(
        body["status"]
            .as_str()
            .ok_or_else(|| malformed("autotrade without status", body))?,
    );
    let end_time =
        parse_time(&body["endTime"]).ok_or_else(|| malformed("autotrade without endTime", body))?;

    Ok(Some(AutotradeSession {
        auto_trade_id,
        status,
        end_time,
    }))
}

/// POST /autotrade/claim → reward and new balance.
pub fn parse_autotrade_claim(body: &Value) -> Result<AutotradeClaim, GatewayError> {
    let balance = |name: &str| {
        parse_f64(&body["balance"][name])
            .ok_or_else(|| malformed(&format!("claim response without balance {name}"), body))
    };

    Ok(AutotradeClaim {
        reward: virtual_reward(&body["reward"], "virtMoney", "virtPoints", body)?,
        balance_money: balance("virt_money")?,
        balance_points: balance("virt_points")?,
    })
}

/// Reward object with `key_money` / `key_points` fields.
fn virtual_reward(val: &Value, key_money: &str, key_points: &str, body: &Value) -> Result<Reward, GatewayError> {
    let field = |name: &str| {
        parse_f64(&val[name]).ok_or_else(|| malformed(&format!("reward without {name}"), body))
    };
    Ok(Reward::Virtual {
        virt_money: field(key_money)?,
        virt_points: field(key_points)?,
    })
}

/// POST /tapping/start_session → `{sessionId, config: {virtMoneyLimit, virtPointsLimit}}`.
pub fn parse_tapping_session(body: &Value) -> Result<TappingSession, GatewayError> {
    let session_id = id_string(&body["sessionId"])
        .ok_or_else(|| malformed("tapping session without sessionId", body))?;
    let limit = |name: &str| {
        parse_f64(&body["config"][name])
            .map(|v| v as i64)
            .ok_or_else(|| malformed(&format!("tapping session without {name}"), body))
    };
    Ok(TappingSession {
        session_id,
        virt_money_limit: limit("virtMoneyLimit")?,
        virt_points_limit: limit("virtPointsLimit")?,
    })
}

/// POST /tapping/finish → `{tapped: {virtMoney, virtPoints}}`.
pub fn parse_tapped(body: &Value) -> Result<Reward, GatewayError> {
    virtual_reward(&body["tapped"], "virtMoney", "virtPoints", body)
}

/// GET /tasks → `{nodes: [{id, description, status}]}`. A missing or null
/// `nodes` means no quests.
pub fn parse_quests(body: &Value) -> Result<Vec<Quest>, GatewayError> {
    let nodes = match &body["nodes"] {
        Value::Array(nodes) => nodes,
        Value::Null => return Ok(Vec::new()),
        _ => return Err(malformed("tasks response with non-array 'nodes'", body)),
    };
    nodes
        .iter()
        .map(|node| -> Result<Quest, GatewayError> {
            Ok(Quest {
                id: id_string(&node["id"]).ok_or_else(|| malformed("task without id", node))?,
                description: node["description"].as_str().unwrap_or_default().to_string(),
                status: QuestStatus::parse(
                    node["status"]
                        .as_str()
                        .ok_or_else(|| malformed("task without status", node))?,
                ),
            })
        })
        .collect()
}

/// POST /tasks/start/{id} → `{status}`.
pub fn parse_quest_start(body: &Value) -> Result<QuestStatus, GatewayError> {
    body["status"]
        .as_str()
        .map(QuestStatus::parse)
        .ok_or_else(|| malformed("task start without status", body))
}

/// POST /tasks/claim/{id} → `{claimed: {virt_money, virt_points}}`, or a body
/// without `claimed` when nothing was credited.
pub fn parse_quest_claim(body: &Value) -> Result<Option<Reward>, GatewayError> {
    match body.get("claimed") {
        None | Some(Value::Null) => Ok(None),
        Some(claimed) => virtual_reward(claimed, "virt_money", "virt_points", body).map(Some),
    }
}

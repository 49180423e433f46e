//! Wire codec for movement intents
//!
//! The only place that knows the text representation used on the intent and state
//! topics: five semicolon-separated fields in the fixed order
//! `thrust;turn;turn_type;gear;curve_rate`, e.g. `forward;left;curve;80;0.40`.

use tracing::{debug, warn};

use super::error::WireError;
use super::intent::{CurveRate, Gear, MovementIntent, Thrust, Turn, TurnType};

const SEPARATOR: char = ';';
const FIELD_NAMES: [&str; 5] = ["thrust", "turn", "turn_type", "gear", "curve_rate"];

/// Result of decoding wire text: always a value, plus any diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub intent: MovementIntent,
    pub issues: Vec<WireError>,
}

impl Decoded {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn encode(intent: &MovementIntent) -> String {
    format!(
        "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{:.2}",
        thrust_token(intent.thrust),
        turn_token(intent.turn),
        turn_type_token(intent.turn_type),
        intent.gear.speed(),
        intent.curve_rate.value()
    )
}

/// Decodes wire text, substituting safe defaults for every unusable field
pub fn decode(text: &str) -> Decoded {
    let mut issues = Vec::new();
    let mut fields = text.trim().split(SEPARATOR).map(str::trim);

    let mut raw: [Option<&str>; 5] = [None; 5];
    for (index, slot) in raw.iter_mut().enumerate() {
        *slot = fields.next();
        if slot.is_none() {
            issues.push(WireError::MissingField(FIELD_NAMES[index]));
        }
    }

    let trailing: Vec<&str> = fields.collect();
    if !trailing.is_empty() {
        issues.push(WireError::TrailingFields(trailing.join(";")));
    }

    let thrust = parse_field(raw[0], FIELD_NAMES[0], parse_thrust, &mut issues);
    let turn = parse_field(raw[1], FIELD_NAMES[1], parse_turn, &mut issues);
    let turn_type = parse_field(raw[2], FIELD_NAMES[2], parse_turn_type, &mut issues);
    let gear = parse_field(raw[3], FIELD_NAMES[3], parse_gear, &mut issues);
    let curve_rate = parse_field(raw[4], FIELD_NAMES[4], parse_curve_rate, &mut issues);

    let mut intent = MovementIntent {
        thrust,
        turn,
        turn_type,
        gear,
        curve_rate,
    };

    if intent.turn_type != TurnType::Curve && intent.curve_rate != CurveRate::None {
        debug!("Dropping curve rate on non-curve intent: {}", text);
        intent.curve_rate = CurveRate::None;
    }

    if let Err(e) = intent.validate() {
        issues.push(WireError::InvalidCombination(e));
        intent = MovementIntent::stop();
    }

    if !issues.is_empty() {
        warn!("Decoded '{}' with {} issue(s): {:?}", text, issues.len(), issues);
    }

    Decoded { intent, issues }
}

fn parse_field<T: Default>(
    raw: Option<&str>,
    field: &'static str,
    parse: fn(&str) -> Option<T>,
    issues: &mut Vec<WireError>,
) -> T {
    let Some(value) = raw else {
        return T::default();
    };
    match parse(value) {
        Some(parsed) => parsed,
        None => {
            issues.push(WireError::InvalidField {
                field,
                value: value.to_string(),
            });
            T::default()
        }
    }
}

fn thrust_token(thrust: Thrust) -> &'static str {
    match thrust {
        Thrust::Forward => "forward",
        Thrust::Backward => "backward",
        Thrust::None => "none",
    }
}

fn turn_token(turn: Turn) -> &'static str {
    match turn {
        Turn::Left => "left",
        Turn::Right => "right",
        Turn::None => "none",
    }
}

fn turn_type_token(turn_type: TurnType) -> &'static str {
    match turn_type {
        TurnType::Spin => "spin",
        TurnType::Pivot => "pivot",
        TurnType::Curve => "curve",
        TurnType::None => "none",
    }
}

fn parse_thrust(value: &str) -> Option<Thrust> {
    match value {
        "forward" => Some(Thrust::Forward),
        "backward" => Some(Thrust::Backward),
        "none" => Some(Thrust::None),
        _ => None,
    }
}

fn parse_turn(value: &str) -> Option<Turn> {
    match value {
        "left" => Some(Turn::Left),
        "right" => Some(Turn::Right),
        "none" => Some(Turn::None),
        _ => None,
    }
}

fn parse_turn_type(value: &str) -> Option<TurnType> {
    match value {
        "spin" => Some(TurnType::Spin),
        "pivot" => Some(TurnType::Pivot),
        "curve" => Some(TurnType::Curve),
        "none" => Some(TurnType::None),
        _ => None,
    }
}

fn parse_gear(value: &str) -> Option<Gear> {
    value.parse::<u8>().ok().and_then(Gear::from_speed)
}

fn parse_curve_rate(value: &str) -> Option<CurveRate> {
    let parsed: f32 = value.parse().ok()?;
    [CurveRate::None, CurveRate::Level1, CurveRate::Level2]
        .into_iter()
        .find(|rate| (rate.value() - parsed).abs() < 0.005)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_valid_intents() -> Vec<MovementIntent> {
        let mut intents = vec![MovementIntent::stop()];
        for gear in Gear::DRIVE {
            for thrust in [Thrust::Forward, Thrust::Backward] {
                intents.push(MovementIntent::straight(thrust, gear));
                for turn in [Turn::Left, Turn::Right] {
                    for rate in CurveRate::LEVELS {
                        intents.push(MovementIntent::curve(thrust, turn, gear, rate));
                    }
                }
            }
            for turn in [Turn::Left, Turn::Right] {
                intents.push(MovementIntent::in_place(turn, false, gear));
                intents.push(MovementIntent::in_place(turn, true, gear));
            }
        }
        intents
    }

    #[test]
    fn encodes_fixed_field_order() {
        let intent = MovementIntent::curve(Thrust::Forward, Turn::Left, Gear::Gear2, CurveRate::Level1);
        assert_eq!(encode(&intent), "forward;left;curve;80;0.40");
        assert_eq!(encode(&MovementIntent::stop()), "none;none;none;0;0.00");
    }

    #[test]
    fn every_valid_intent_survives_the_wire() {
        for intent in all_valid_intents() {
            assert!(intent.validate().is_ok(), "fixture invalid: {intent}");
            let decoded = decode(&encode(&intent));
            assert!(decoded.is_clean(), "issues for {intent}: {:?}", decoded.issues);
            assert_eq!(decoded.intent, intent);
        }
    }

    #[test]
    fn unknown_field_falls_back_and_reports() {
        let decoded = decode("forward;none;none;75;0.00");
        assert_eq!(
            decoded.issues[0],
            WireError::InvalidField {
                field: "gear",
                value: "75".to_string()
            }
        );
        // forward with STOP gear violates the gear rule, so the whole intent collapses
        assert_eq!(decoded.intent, MovementIntent::stop());
    }

    #[test]
    fn unknown_turn_type_with_turn_collapses_to_stop() {
        let decoded = decode("forward;left;sideways;90;0.40");
        assert_eq!(decoded.issues.len(), 2);
        assert!(matches!(decoded.issues[1], WireError::InvalidCombination(_)));
        assert_eq!(decoded.intent, MovementIntent::stop());
    }

    #[test]
    fn bad_curve_rate_on_straight_intent_keeps_motion() {
        let decoded = decode("backward;none;none;100;banana");
        assert_eq!(decoded.issues.len(), 1);
        assert_eq!(decoded.intent, MovementIntent::straight(Thrust::Backward, Gear::Gear4));
    }

    #[test]
    fn curve_rate_is_dropped_when_not_curving() {
        let decoded = decode("none;left;spin;70;0.60");
        assert!(decoded.is_clean());
        assert_eq!(decoded.intent.curve_rate, CurveRate::None);
    }

    #[test]
    fn missing_and_trailing_fields_are_reported() {
        let short = decode("forward;none");
        assert!(short.issues.contains(&WireError::MissingField("gear")));
        assert_eq!(short.intent, MovementIntent::stop());

        let long = decode("none;none;none;0;0.00;extra");
        assert_eq!(long.issues, vec![WireError::TrailingFields("extra".to_string())]);
        assert_eq!(long.intent, MovementIntent::stop());
    }

    #[test]
    fn malformed_input_always_yields_valid_intent() {
        let samples = [
            "",
            ";;;;",
            ";;;;;;;;",
            "FORWARD;LEFT;CURVE;80;0.4",
            "forward;left;curve;80",
            "none;right;pivot;0;0.00",
            "backward;right;curve;90;-1",
            "\u{0}\u{1};\n;💥;255;NaN",
            "forward;left;curve;80;0.40;forward;left",
            "none;none;curve;70;0.60",
            "   forward ; right ; curve ; 90 ; 0.6 ",
        ];
        for sample in samples {
            let decoded = decode(sample);
            assert!(
                decoded.intent.validate().is_ok(),
                "invalid result for {sample:?}: {}",
                decoded.intent
            );
        }
    }

    #[test]
    fn tolerates_whitespace_and_short_precision() {
        let decoded = decode(" forward ; right ; curve ; 90 ; 0.6 ");
        assert!(decoded.is_clean());
        assert_eq!(
            decoded.intent,
            MovementIntent::curve(Thrust::Forward, Turn::Right, Gear::Gear3, CurveRate::Level2)
        );
    }
}

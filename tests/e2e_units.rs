//! End-to-end tests for unit-aware evaluation: dimension checks, compound
//! symbols, conversions between registered units.

use unitgraph::{ComputationStatus, ErrorKind, NodeId, UnitRegistry, Workspace};

fn with_unit(ws: &Workspace, name: &str, value: f64, symbol: &str) -> NodeId {
    let unit = ws.units().by_symbol(symbol).map(|u| u.id);
    assert!(unit.is_some(), "unit {symbol} not registered");
    ws.create_literal(value, unit, Some(name), None).unwrap().id
}

fn eval(ws: &Workspace, src: &str) -> unitgraph::RecalculationResult {
    let node = ws.create_expression(src, None, None).unwrap();
    ws.recalculate(node.id).unwrap()
}

// ============================================================================
// 1. Dimensional analysis
// ============================================================================

#[test]
fn test_adding_length_and_time_fails() {
    let ws = Workspace::new();
    with_unit(&ws, "len", 5.0, "m");
    with_unit(&ws, "dur", 3.0, "s");
    let r = eval(&ws, "#len + #dur");
    assert!(!r.success);
    assert_eq!(r.status, ComputationStatus::Error);
    assert_eq!(r.value, None);
    let msg = r.error.unwrap();
    assert!(msg.contains("Dimension mismatch"), "{msg}");
}

#[test]
fn test_multiplying_builds_symbol() {
    let ws = Workspace::new();
    with_unit(&ws, "len", 5.0, "m");
    with_unit(&ws, "dur", 3.0, "s");
    let r = eval(&ws, "#len * #dur");
    assert_eq!(r.value, Some(15.0));
    assert_eq!(r.unit_symbol.as_deref(), Some("m·s"));
}

#[test]
fn test_newton_from_base_units() {
    let ws = Workspace::new();
    with_unit(&ws, "mass", 2.0, "kg");
    with_unit(&ws, "dist", 3.0, "m");
    with_unit(&ws, "t", 1.0, "s");
    let r = eval(&ws, "#mass * #dist / #t ^ 2");
    assert_eq!(r.value, Some(6.0));
    assert_eq!(r.unit_symbol.as_deref(), Some("kg·m/s²"));
}

#[test]
fn test_units_cancel_to_dimensionless() {
    let ws = Workspace::new();
    with_unit(&ws, "a", 6.0, "m");
    with_unit(&ws, "b", 2.0, "m");
    let r = eval(&ws, "#a / #b");
    assert_eq!(r.value, Some(3.0));
    assert_eq!(r.unit_symbol.as_deref(), Some("1"));

    let r = eval(&ws, "ln(#a / #b)");
    assert!(r.success);
}

#[test]
fn test_exponent_rules() {
    let ws = Workspace::new();
    with_unit(&ws, "side", 4.0, "m");
    with_unit(&ws, "n", 2.0, "s");

    let r = eval(&ws, "#side ^ 3");
    assert_eq!(r.unit_symbol.as_deref(), Some("m³"));

    let r = eval(&ws, "#side ^ 1.5");
    assert!(!r.success);
    let node = ws.nodes().pop().unwrap();
    assert_eq!(node.error_kind, Some(ErrorKind::DimensionMismatch));

    let r = eval(&ws, "2 ^ #n");
    assert!(!r.success);
    let node = ws.nodes().pop().unwrap();
    assert_eq!(node.error_kind, Some(ErrorKind::NonDimensionlessExponent));
}

#[test]
fn test_function_on_dimensioned_value() {
    let ws = Workspace::new();
    with_unit(&ws, "angle", 1.0, "m");
    let r = eval(&ws, "sin(#angle)");
    assert!(!r.success);
    assert!(r.error.unwrap().contains("sin()"));
}

// ============================================================================
// 2. Conversions
// ============================================================================

#[test]
fn test_addition_converts_compatible_units() {
    let ws = Workspace::new();
    with_unit(&ws, "long", 2.0, "km");
    with_unit(&ws, "short", 500.0, "m");
    let r = eval(&ws, "#long + #short");
    assert!((r.value.unwrap() - 2.5).abs() < 1e-12);
    assert_eq!(r.unit_symbol.as_deref(), Some("km"));

    let r = eval(&ws, "#short - #long");
    assert_eq!(r.value, Some(-1500.0));
    assert_eq!(r.unit_symbol.as_deref(), Some("m"));
}

#[test]
fn test_addition_across_equivalent_symbols() {
    let ws = Workspace::new();
    with_unit(&ws, "force", 10.0, "N");
    with_unit(&ws, "mass", 2.0, "kg");
    with_unit(&ws, "dist", 3.0, "m");
    with_unit(&ws, "t", 1.0, "s");
    let r = eval(&ws, "#force + #mass * #dist / #t ^ 2");
    assert!(r.success, "{:?}", r.error);
    assert!((r.value.unwrap() - 16.0).abs() < 1e-12);
    assert_eq!(r.unit_symbol.as_deref(), Some("N"));

    with_unit(&ws, "pull", 1.0, "kN");
    let r = eval(&ws, "#pull - #mass * #dist / #t ^ 2");
    assert!((r.value.unwrap() - 0.994).abs() < 1e-12);
    assert_eq!(r.unit_symbol.as_deref(), Some("kN"));
}

#[test]
fn test_function_of_scaled_ratio() {
    let ws = Workspace::new();
    with_unit(&ws, "km_value", 1.0, "km");
    with_unit(&ws, "m_value", 1.0, "m");
    let r = eval(&ws, "ln(#km_value / #m_value)");
    assert!(r.success, "{:?}", r.error);
    assert!((r.value.unwrap() - 1000f64.ln()).abs() < 1e-12);
    assert_eq!(r.unit_symbol.as_deref(), Some("1"));
}

#[test]
fn test_conversion_chain_and_offsets() {
    let units = UnitRegistry::with_si_defaults();
    let f = units.convert_symbols(212.0, "°F", "K").unwrap();
    assert!((f - 373.15).abs() < 1e-9);
    let back = units.convert_symbols(373.15, "K", "°F").unwrap();
    assert!((back - 212.0).abs() < 1e-9);
    let bar = units.convert_symbols(1.0, "bar", "kPa").unwrap();
    assert!((bar - 100.0).abs() < 1e-9);
}

#[test]
fn test_workspace_convert_reports_symbol() {
    let ws = Workspace::new();
    let v = ws.convert(90.0, "min", "h").unwrap();
    assert!((v.value - 1.5).abs() < 1e-12);
    assert_eq!(v.unit_symbol, "h");
    assert!(ws.convert(1.0, "kg", "m").is_err());
    assert!(ws.convert(1.0, "furlong", "m").is_err());
}

// ============================================================================
// 3. Every valid result carries a symbol
// ============================================================================

#[test]
fn test_valid_results_have_symbols() {
    let ws = Workspace::new();
    with_unit(&ws, "p", 3.0, "kPa");
    let r = ws.create_reference(ws.node_by_name("p").unwrap().id, Some("mirror"), None).unwrap();
    let out = ws.recalculate(r.id).unwrap();
    assert_eq!(out.value, Some(3.0));
    assert_eq!(out.unit_symbol.as_deref(), Some("kPa"));

    let bulk = ws.recalculate_stale().unwrap();
    assert_eq!(bulk.failed, 0);
    for node in ws.nodes() {
        let value = ws.value(node.id).unwrap();
        assert!(!value.unit_symbol.is_empty());
    }
    let plain = eval(&ws, "1 + 2");
    assert_eq!(plain.unit_symbol.as_deref(), Some("1"));
}

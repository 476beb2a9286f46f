//! Route/call path normalization for linking frontend call sites to backend routes.

/// One segment of a normalized endpoint path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param,
}

/// Normalize a route pattern or call URL into comparable segments.
///
/// Scheme and host are dropped, as are query strings and fragments. Parameter
/// syntaxes `:id`, `{id}`, `<int:id>`, `${expr}` become [`Segment::Param`].
/// Leading parameters (base-URL templates such as `${API_BASE}`) are dropped.
/// Returns `None` when nothing literal remains.
pub fn normalize(raw: &str) -> Option<Vec<Segment>> {
    let mut path = raw.trim();
    if let Some(idx) = path.find("://") {
        let after = &path[idx + 3..];
        path = after.find('/').map(|i| &after[i..]).unwrap_or("");
    }
    let path = path.split(['?', '#']).next().unwrap_or("");

    let mut segments: Vec<Segment> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if is_param(s) {
                Segment::Param
            } else {
                Segment::Literal(s.to_lowercase())
            }
        })
        .collect();

    let first_literal = segments
        .iter()
        .position(|s| matches!(s, Segment::Literal(_)))?;
    segments.drain(..first_literal);
    Some(segments)
}

fn is_param(segment: &str) -> bool {
    segment.starts_with(':')
        || (segment.starts_with('{') && segment.ends_with('}'))
        || (segment.starts_with('<') && segment.ends_with('>'))
        || segment.contains("${")
        || segment.contains('{')
}

/// Whether a call path matches a route pattern segment-by-segment.
pub fn matches(route: &[Segment], call: &[Segment]) -> bool {
    route.len() == call.len()
        && route.iter().zip(call).all(|pair| match pair {
            (Segment::Literal(a), Segment::Literal(b)) => a == b,
            _ => true,
        })
}

pub fn methods_compatible(route_method: &str, call_method: &str) -> bool {
    route_method.eq_ignore_ascii_case(call_method)
        || matches!(route_method, "ANY" | "ALL")
        || (route_method == "PUT" && call_method.eq_ignore_ascii_case("PATCH"))
        || (route_method == "PATCH" && call_method.eq_ignore_ascii_case("PUT"))
}

/// Positions where one side is a parameter and the other a literal.
pub fn kind_mismatches(route: &[Segment], call: &[Segment]) -> usize {
    route
        .iter()
        .zip(call)
        .filter(|(a, b)| (**a == Segment::Param) != (**b == Segment::Param))
        .count()
}

/// Count of parameter segments, used to prefer the most specific route.
pub fn param_count(segments: &[Segment]) -> usize {
    segments.iter().filter(|s| **s == Segment::Param).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Segment {
        Segment::Literal(s.to_string())
    }

    #[test]
    fn parameter_styles_normalize_alike() {
        let expected = vec![lit("patients"), Segment::Param];
        assert_eq!(normalize("/patients/:id").unwrap(), expected);
        assert_eq!(normalize("/patients/{patient_id}").unwrap(), expected);
        assert_eq!(normalize("/patients/<int:patient_id>").unwrap(), expected);
        assert_eq!(normalize("/Patients/${id}/").unwrap(), expected);
    }

    #[test]
    fn base_urls_and_queries_are_stripped() {
        assert_eq!(
            normalize("https://api.example.com/v1/invoices?page=2").unwrap(),
            vec![lit("v1"), lit("invoices")]
        );
        assert_eq!(
            normalize("${API_BASE}/invoices").unwrap(),
            vec![lit("invoices")]
        );
        assert!(normalize("${url}").is_none());
        assert!(normalize("/").is_none());
    }

    #[test]
    fn matching_respects_length_and_literals() {
        let route = normalize("/api/patients/:id").unwrap();
        assert!(matches(&route, &normalize("/api/patients/${p.id}").unwrap()));
        assert!(!matches(&route, &normalize("/api/patients").unwrap()));
        assert!(!matches(&route, &normalize("/api/doctors/1").unwrap()));
        let call = normalize("/api/patients/${id}").unwrap();
        assert_eq!(kind_mismatches(&route, &call), 0);
        assert_eq!(kind_mismatches(&normalize("/api/patients/new").unwrap(), &call), 1);
    }

    #[test]
    fn method_compatibility() {
        assert!(methods_compatible("GET", "get"));
        assert!(methods_compatible("ANY", "DELETE"));
        assert!(methods_compatible("PUT", "PATCH"));
        assert!(!methods_compatible("POST", "GET"));
    }
}

//! Chaînes de temps UPnP (`H+:MM:SS[.F+]` ou `H+:MM:SS.F0/F1`)

/// Formate une durée en `HH:MM:SS`, zéro pour une valeur négative ou inconnue
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Parse une chaîne de temps UPnP en secondes.
///
/// Accepte aussi les formes courtes `MM:SS` et `SS` envoyées par certains
/// points de contrôle.
pub fn parse_time(value: &str) -> Option<f64> {
    let value = value.trim();
    let value = value.strip_prefix('+').unwrap_or(value);
    if value.is_empty() || value.starts_with('-') {
        return None;
    }

    let (clock, fraction) = match value.split_once('.') {
        Some((clock, fraction)) => (clock, parse_fraction(fraction)?),
        None => (value, 0.0),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }

    let mut seconds = 0.0;
    for (i, part) in parts.iter().enumerate() {
        let n: u64 = part.parse().ok()?;
        // Minutes et secondes bornées quand une unité supérieure est présente
        if i > 0 && n >= 60 {
            return None;
        }
        seconds = seconds * 60.0 + n as f64;
    }
    Some(seconds + fraction)
}

fn parse_fraction(fraction: &str) -> Option<f64> {
    if let Some((num, den)) = fraction.split_once('/') {
        let num: u64 = num.parse().ok()?;
        let den: u64 = den.parse().ok()?;
        if den == 0 || num >= den {
            return None;
        }
        return Some(num as f64 / den as f64);
    }
    if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    format!("0.{}", fraction).parse().ok()
}

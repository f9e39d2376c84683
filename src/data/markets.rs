//! Static mandi coordinates
//!
//! Lookup table mapping known market names to their latitude and longitude,
//! used by the proximity search in [`crate::geo`].

/// A regulated wholesale market with a known location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Market {
    /// Market name as it appears in upstream records
    pub name: &'static str,
    pub state: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

/// Static array of all markets with known coordinates
pub static MARKETS: [Market; 10] = [
    Market {
        name: "Pune",
        state: "Maharashtra",
        latitude: 18.5204,
        longitude: 73.8567,
    },
    Market {
        name: "Baramati",
        state: "Maharashtra",
        latitude: 18.1514,
        longitude: 74.5777,
    },
    Market {
        name: "Nashik",
        state: "Maharashtra",
        latitude: 19.9975,
        longitude: 73.7898,
    },
    Market {
        name: "Solapur",
        state: "Maharashtra",
        latitude: 17.6599,
        longitude: 75.9064,
    },
    Market {
        name: "Karimnagar",
        state: "Telangana",
        latitude: 18.4386,
        longitude: 79.1288,
    },
    Market {
        name: "Hyderabad",
        state: "Telangana",
        latitude: 17.3850,
        longitude: 78.4867,
    },
    Market {
        name: "Nizamabad",
        state: "Telangana",
        latitude: 18.6725,
        longitude: 78.0941,
    },
    Market {
        name: "Warangal",
        state: "Telangana",
        latitude: 17.9689,
        longitude: 79.5941,
    },
    Market {
        name: "Vijayawada",
        state: "Andhra Pradesh",
        latitude: 16.5062,
        longitude: 80.6480,
    },
    Market {
        name: "Guntur",
        state: "Andhra Pradesh",
        latitude: 16.3067,
        longitude: 80.4365,
    },
];

/// Finds the coordinates for a market name as written in a record
///
/// Matching is case-insensitive. An exact name match wins; otherwise the first
/// known market whose name is contained in `name` is used, so
/// `"Karimnagar APMC"` resolves to Karimnagar.
pub fn find_market(name: &str) -> Option<&'static Market> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    MARKETS
        .iter()
        .find(|market| market.name.to_lowercase() == needle)
        .or_else(|| {
            MARKETS
                .iter()
                .find(|market| needle.contains(&market.name.to_lowercase()))
        })
}

/// Get all markets with known coordinates
pub fn all_markets() -> &'static [Market] {
    &MARKETS
}

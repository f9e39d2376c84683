//! Static sample datasets
//!
//! Hard-coded records served when a source has never produced live data.
//! Every sample record names its dataset in `Source` so clients can tell
//! sample rows from upstream rows in a merged response.

use super::{Field, Record};

/// Cache key of the data.gov.in APMC feed
pub const SOURCE_GOV_API: &str = "gov_api";

/// Cache key of the Agmarknet scrape feed
pub const SOURCE_AGMARKNET: &str = "agmarknet";

/// Cache key of the CommodityOnline scrape feed
pub const SOURCE_COMMODITY_ONLINE: &str = "commodity_online";

type PriceRow = (&'static str, &'static str, &'static str, &'static str);

/// A mandi with its own sample price table
struct MarketSample {
    state: &'static str,
    district: &'static str,
    /// `(commodity, min, max, avg)`
    prices: [PriceRow; 10],
}

/// Served when a location is unknown or not given
const DEFAULT_MARKET: usize = 1;

static MARKET_SAMPLES: [MarketSample; 5] = [
    MarketSample {
        state: "Telangana",
        district: "Hyderabad",
        prices: [
            ("Paddy", "2250", "2550", "2400"),
            ("Cotton", "4300", "4900", "4600"),
            ("Sugarcane", "290", "330", "310"),
            ("Groundnut", "6300", "6900", "6600"),
            ("Maize", "1850", "2150", "2000"),
            ("Jowar", "1550", "1850", "1700"),
            ("Chilli", "8500", "12500", "10500"),
            ("Turmeric", "5700", "7700", "6700"),
            ("Soybean", "4600", "5300", "4950"),
            ("Mustard", "3300", "3900", "3600"),
        ],
    },
    MarketSample {
        state: "Telangana",
        district: "Karimnagar",
        prices: [
            ("Paddy", "2200", "2500", "2350"),
            ("Cotton", "4200", "4800", "4500"),
            ("Sugarcane", "280", "320", "300"),
            ("Groundnut", "6200", "6800", "6500"),
            ("Maize", "1800", "2100", "1950"),
            ("Jowar", "1500", "1800", "1650"),
            ("Chilli", "8000", "12000", "10000"),
            ("Turmeric", "5500", "7500", "6500"),
            ("Soybean", "4500", "5200", "4850"),
            ("Mustard", "3200", "3800", "3500"),
        ],
    },
    MarketSample {
        state: "Telangana",
        district: "Nizamabad",
        prices: [
            ("Paddy", "2180", "2480", "2330"),
            ("Cotton", "4100", "4700", "4400"),
            ("Sugarcane", "270", "310", "290"),
            ("Groundnut", "6100", "6700", "6400"),
            ("Maize", "1780", "2080", "1930"),
            ("Jowar", "1480", "1780", "1630"),
            ("Chilli", "7800", "11800", "9800"),
            ("Turmeric", "5300", "7300", "6300"),
            ("Soybean", "4400", "5100", "4750"),
            ("Mustard", "3100", "3700", "3400"),
        ],
    },
    MarketSample {
        state: "Andhra Pradesh",
        district: "Vijayawada",
        prices: [
            ("Paddy", "2300", "2600", "2450"),
            ("Cotton", "4400", "5000", "4700"),
            ("Sugarcane", "300", "340", "320"),
            ("Groundnut", "6400", "7000", "6700"),
            ("Maize", "1900", "2200", "2050"),
            ("Jowar", "1600", "1900", "1750"),
            ("Chilli", "9000", "13000", "11000"),
            ("Turmeric", "5900", "7900", "6900"),
            ("Soybean", "4700", "5400", "5050"),
            ("Mustard", "3400", "4000", "3700"),
        ],
    },
    MarketSample {
        state: "Maharashtra",
        district: "Pune",
        prices: [
            ("Paddy", "2400", "2700", "2550"),
            ("Cotton", "4500", "5100", "4800"),
            ("Sugarcane", "310", "350", "330"),
            ("Groundnut", "6500", "7100", "6800"),
            ("Maize", "2000", "2300", "2150"),
            ("Jowar", "1700", "2000", "1850"),
            ("Chilli", "9500", "13500", "11500"),
            ("Turmeric", "6100", "8100", "7100"),
            ("Soybean", "4800", "5500", "5150"),
            ("Mustard", "3500", "4100", "3800"),
        ],
    },
];

/// `(commodity, min, max, avg)` national averages
const NATIONAL_PRICES: [PriceRow; 4] = [
    ("Wheat", "2100", "2400", "2250"),
    ("Rice", "2500", "3000", "2750"),
    ("Soybean", "4000", "4600", "4300"),
    ("Mustard", "5200", "5800", "5500"),
];

/// `(commodity, state, district, market, min, max, modal)`
const GOVERNMENT_PRICES: [(&str, &str, &str, &str, &str, &str, &str); 6] = [
    ("Paddy", "Telangana", "Hyderabad", "Hyderabad", "2250", "2550", "2400"),
    ("Cotton", "Telangana", "Warangal", "Warangal", "4300", "4900", "4600"),
    ("Turmeric", "Telangana", "Nizamabad", "Nizamabad", "5300", "7300", "6300"),
    ("Chilli", "Andhra Pradesh", "Guntur", "Guntur", "9000", "13000", "11000"),
    ("Onion", "Maharashtra", "Nashik", "Nashik", "1200", "1800", "1500"),
    ("Soybean", "Maharashtra", "Pune", "Pune", "4800", "5500", "5150"),
];

/// State and district picking a location-specific sample
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub state: Option<String>,
    pub district: Option<String>,
}

impl Location {
    pub fn new(state: Option<&str>, district: Option<&str>) -> Self {
        let given = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        Self {
            state: given(state),
            district: given(district),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.district.is_none()
    }

    fn matches(&self, market: &MarketSample) -> bool {
        let same = |wanted: &Option<String>, actual: &str| {
            wanted
                .as_deref()
                .map_or(true, |wanted| wanted.eq_ignore_ascii_case(actual))
        };
        !self.is_empty() && same(&self.state, market.state) && same(&self.district, market.district)
    }
}

/// Returns the sample dataset for a source key, or an empty list for unknown keys
pub fn sample_for(source_key: &str) -> Vec<Record> {
    sample_for_location(source_key, &Location::default())
}

/// Like [`sample_for`], but the Agmarknet sample follows `location`
///
/// A location with only a state picks that state's first sampled district.
/// Unknown locations get the Karimnagar table.
pub fn sample_for_location(source_key: &str, location: &Location) -> Vec<Record> {
    match source_key {
        SOURCE_AGMARKNET => market_sample(location),
        SOURCE_COMMODITY_ONLINE => commodity_online_sample(),
        SOURCE_GOV_API => government_sample(),
        _ => Vec::new(),
    }
}

fn market_sample(location: &Location) -> Vec<Record> {
    let market = MARKET_SAMPLES
        .iter()
        .find(|market| location.matches(market))
        .unwrap_or(&MARKET_SAMPLES[DEFAULT_MARKET]);

    market
        .prices
        .iter()
        .map(|(commodity, min, max, avg)| {
            Record::builder()
                .set(Field::Commodity, *commodity)
                .set(Field::State, market.state)
                .set(Field::District, market.district)
                .set(Field::Market, market.district)
                .set(Field::MinPrice, *min)
                .set(Field::MaxPrice, *max)
                .set(Field::AvgPrice, *avg)
                .set(Field::Source, "Agmarknet (sample)")
                .build()
        })
        .collect()
}

fn commodity_online_sample() -> Vec<Record> {
    NATIONAL_PRICES
        .iter()
        .map(|(commodity, min, max, avg)| {
            Record::builder()
                .set(Field::Commodity, *commodity)
                .set(Field::State, "India")
                .set(Field::District, "National")
                .set(Field::Market, "Commodity Online")
                .set(Field::MinPrice, *min)
                .set(Field::MaxPrice, *max)
                .set(Field::AvgPrice, *avg)
                .set(Field::Source, "CommodityOnline (sample)")
                .build()
        })
        .collect()
}

fn government_sample() -> Vec<Record> {
    GOVERNMENT_PRICES
        .iter()
        .map(|(commodity, state, district, market, min, max, modal)| {
            Record::builder()
                .set(Field::Commodity, *commodity)
                .set(Field::State, *state)
                .set(Field::District, *district)
                .set(Field::Market, *market)
                .set(Field::MinPrice, *min)
                .set(Field::MaxPrice, *max)
                .set(Field::ModalPrice, *modal)
                .set(Field::Source, "Government (data.gov.in) (sample)")
                .build()
        })
        .collect()
}

//! Static slug filters
//!
//! Pure string-matching stage that runs before any market detail is
//! fetched: a denylist of noisy keyword fragments and sports/league
//! abbreviations, plus the crypto tag used for allocation discounting.

/// Fragments that disqualify a market wherever they appear in the slug.
const SKIP_FRAGMENTS: &[&str] = &[
    "15m", "spl", "1pt5", "2pt5", "3pt5", "4pt5", "win", "lose", "draw",
    "super-bowl", "lol", "dota2", "cs2", "valorant", "0pt5", "0pt",
];

/// League and category abbreviations, matched only as whole hyphen-delimited
/// slug segments (`nba-finals` matches, `nbank` does not).
const ABBREVIATIONS: &[&str] = &[
    "ncaab", "temperature", "epl", "lal", "acn", "ipl", "wnba", "bun", "mlb",
    "cfb", "nfl", "fl1", "sea", "ucl", "afc", "ofc", "fif", "ere", "arg",
    "itc", "mex", "lcs", "lib", "sud", "tur", "con", "cof", "uef", "caf",
    "rus", "efa", "efl", "nba", "nhl", "uel", "dota2", "lol", "odi", "t20",
    "abb", "csa", "atp", "wta", "mls", "val", "cs2", "cwbb", "mma", "cdr",
    "mlbb", "ow", "crban", "codmw", "fifa", "rutopft", "pubg", "r6siege",
    "rl", "bkligend", "bknbl", "col", "cde", "dfb", "bra", "jap", "ja2",
    "kor", "spl", "chi", "aus", "ind", "nor", "den", "por", "test", "she",
    "sasa", "lpl", "psp", "kbo", "shl", "cehl", "dehl", "snhl", "khl", "ahl",
    "crint", "cbb", "craus", "creng", "crnew", "crind", "crsou", "crpak",
    "cruae", "hok", "wildrift", "sc2", "sc", "ruprem", "ssc", "bkcl",
    "bkseriea", "bkcba", "bkfr1", "bkarg", "bkkbl", "rusixnat", "rueuchamp",
    "ruurc", "rusrp", "ruchamp", "cru19wc", "crwpl20", "crwncl", "crwt20wcgq",
    "crafgwi20", "crbtnmlyhkg20", "zuffa", "mar1", "egy1", "cze1", "bol1",
    "rou1", "mwoh", "bra2", "per1", "wwoh", "col1", "chi1",
];

const CRYPTO_KEYWORDS: &[&str] = &[
    "btc", "eth", "sol", "xrp", "bitcoin", "ethereum", "solana", "ripple",
];

/// Whether a market slug is excluded by the static denylist.
pub fn should_skip_slug(slug: &str) -> bool {
    let s = slug.to_lowercase();

    if SKIP_FRAGMENTS.iter().any(|frag| s.contains(frag)) {
        return true;
    }

    s.split('-').any(|segment| ABBREVIATIONS.contains(&segment))
}

/// Case-insensitive tag for high-volatility crypto instruments.
pub fn is_crypto_slug(slug: &str) -> bool {
    let s = slug.to_lowercase();
    CRYPTO_KEYWORDS.iter().any(|kw| s.contains(kw))
}

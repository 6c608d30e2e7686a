//! COROS sport-type-code -> display-name table, used by the template context
//! builder to populate the `sport` variable before an operator overrides it
//! via `Settings.sport_mapping`.

use std::collections::HashMap;

use lazy_static::lazy_static;

lazy_static! {
    pub static ref COROS_SPORT_NAMES: HashMap<i32, &'static str> = HashMap::from([
        (100, "跑步"),
        (101, "室内跑"),
        (102, "越野跑"),
        (103, "铁人三项跑"),
        (200, "骑行"),
        (201, "室内骑行"),
        (300, "泳池游泳"),
        (301, "开放水域游泳"),
        (302, "铁人三项游泳"),
        (400, "铁人三项"),
        (500, "有氧运动"),
        (501, "力量训练"),
        (502, "有氧健身操"),
        (503, "高强度间歇"),
        (504, "健身瑜伽"),
        (600, "健走"),
        (601, "室内健走"),
        (700, "徒步"),
        (800, "登山"),
        (900, "滑雪"),
        (901, "单板滑雪"),
        (902, "越野滑雪"),
        (1000, "划船"),
        (1001, "室内划船"),
        (1100, "跳绳"),
        (1200, "飞盘"),
        (1300, "水上运动"),
        (1301, "皮划艇"),
        (1302, "帆船"),
        (1303, "冲浪"),
        (1400, "速降"),
        (1500, "攀岩"),
        (1600, "网球"),
        (1700, "跑步机"),
        (1800, "综合训练"),
        (9999, "其他"),
    ]);
}

const FALLBACK_SPORT_NAME: &str = "运动";

/// Default sport name for `sport_code`, used when `Settings.sport_mapping`
/// has no override for it.
pub fn default_sport_name(sport_code: i32) -> &'static str {
    COROS_SPORT_NAMES
        .get(&sport_code)
        .copied()
        .unwrap_or(FALLBACK_SPORT_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_code_resolves() {
        assert_eq!(default_sport_name(100), "跑步");
    }

    #[test]
    fn unknown_code_falls_back() {
        assert_eq!(default_sport_name(42), FALLBACK_SPORT_NAME);
    }
}

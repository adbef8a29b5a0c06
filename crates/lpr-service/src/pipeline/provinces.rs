//! Province codes of Vietnamese registration plates.

use common::plates::UNKNOWN_PROVINCE;
use once_cell::sync::Lazy;
use std::collections::HashMap;

const HA_NOI: &str = "Hà Nội";
const HO_CHI_MINH: &str = "TP. Hồ Chí Minh";

static PROVINCES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let entries: &[(&str, &str)] = &[
        ("11", "Cao Bằng"),
        ("12", "Lạng Sơn"),
        ("14", "Quảng Ninh"),
        ("15", "Hải Phòng"),
        ("16", "Hải Phòng"),
        ("17", "Thái Bình"),
        ("18", "Nam Định"),
        ("19", "Phú Thọ"),
        ("20", "Thái Nguyên"),
        ("21", "Yên Bái"),
        ("22", "Tuyên Quang"),
        ("23", "Hà Giang"),
        ("24", "Lào Cai"),
        ("25", "Lai Châu"),
        ("26", "Sơn La"),
        ("27", "Điện Biên"),
        ("28", "Hòa Bình"),
        ("29", HA_NOI),
        ("30", HA_NOI),
        ("31", HA_NOI),
        ("32", HA_NOI),
        ("33", HA_NOI),
        ("40", HA_NOI),
        ("34", "Hải Dương"),
        ("35", "Ninh Bình"),
        ("36", "Thanh Hóa"),
        ("37", "Nghệ An"),
        ("38", "Hà Tĩnh"),
        ("43", "Đà Nẵng"),
        ("47", "Đắk Lắk"),
        ("48", "Đắk Nông"),
        ("49", "Lâm Đồng"),
        ("50", HO_CHI_MINH),
        ("51", HO_CHI_MINH),
        ("52", HO_CHI_MINH),
        ("53", HO_CHI_MINH),
        ("54", HO_CHI_MINH),
        ("55", HO_CHI_MINH),
        ("56", HO_CHI_MINH),
        ("57", HO_CHI_MINH),
        ("58", HO_CHI_MINH),
        ("59", HO_CHI_MINH),
        ("60", "Đồng Nai"),
        ("61", "Bình Dương"),
        ("62", "Long An"),
        ("63", "Tiền Giang"),
        ("64", "Vĩnh Long"),
        ("65", "Cần Thơ"),
        ("66", "Đồng Tháp"),
        ("67", "An Giang"),
        ("68", "Kiên Giang"),
        ("69", "Cà Mau"),
        ("70", "Tây Ninh"),
        ("71", "Bến Tre"),
        ("72", "Bà Rịa - Vũng Tàu"),
        ("73", "Quảng Bình"),
        ("74", "Quảng Trị"),
        ("75", "Thừa Thiên Huế"),
        ("76", "Quảng Ngãi"),
        ("77", "Bình Định"),
        ("78", "Phú Yên"),
        ("79", "Khánh Hòa"),
        ("81", "Gia Lai"),
        ("82", "Kon Tum"),
        ("83", "Sóc Trăng"),
        ("84", "Trà Vinh"),
        ("85", "Ninh Thuận"),
        ("86", "Bình Thuận"),
        ("88", "Vĩnh Phúc"),
        ("89", "Hưng Yên"),
        ("90", "Hà Nam"),
        ("92", "Quảng Nam"),
        ("93", "Bình Phước"),
        ("94", "Bạc Liêu"),
        ("95", "Hậu Giang"),
        ("97", "Bắc Kạn"),
        ("98", "Bắc Giang"),
        ("99", "Bắc Ninh"),
    ];
    entries.iter().copied().collect()
});

/// Display name for a two-digit province code.
pub fn province_name(code: &str) -> Option<&'static str> {
    PROVINCES.get(code).copied()
}

/// Name for a parsed plate: the mapped name, otherwise the unknown marker.
/// A plate that carries no code at all is unmapped too.
pub fn resolve_province_name(code: &str) -> String {
    province_name(code).unwrap_or(UNKNOWN_PROVINCE).to_string()
}

/// Number of mapped codes.
pub fn known_codes() -> usize {
    PROVINCES.len()
}

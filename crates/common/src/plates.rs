//! Plate recognition contracts shared by the LPR service and its clients.
//!
//! These types are the wire format consumed by the web client: field names
//! are snake_case and mirror the `PlateAnalysis` / `Detection` shapes it
//! renders.

use serde::{Deserialize, Serialize};

/// Placeholder returned when no recognition pass produced any text.
pub const UNREADABLE_PLATE: &str = "Không đọc được biển số";

/// Placeholder returned when no plate could be located in the image.
pub const UNDETECTED_PLATE: &str = "Không phát hiện được biển số";

/// Province name used when a structurally valid plate carries an unmapped code.
pub const UNKNOWN_PROVINCE: &str = "Không xác định";

/// Registration category of a plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateType {
    Personal,
    Commercial,
    Government,
    Military,
    Police,
    Diplomatic,
    International,
}

impl PlateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlateType::Personal => "personal",
            PlateType::Commercial => "commercial",
            PlateType::Government => "government",
            PlateType::Military => "military",
            PlateType::Police => "police",
            PlateType::Diplomatic => "diplomatic",
            PlateType::International => "international",
        }
    }
}

/// Vehicle category implied by the first character of a plate serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Car,
    Truck,
    Bus,
    SpecialPurpose,
    Tractor,
    Agricultural,
    Motorbike,
    Moped,
    Trailer,
    Motorcycle,
    ThreeWheeler,
    Pickup,
    Construction,
    Tourist,
    Other,
}

impl VehicleType {
    /// Total lookup: every character has an outcome, unmapped ones are `Other`.
    pub fn from_serial_letter(letter: char) -> Self {
        match letter.to_ascii_uppercase() {
            'A' => VehicleType::Car,
            'B' => VehicleType::Truck,
            'C' => VehicleType::Bus,
            'D' => VehicleType::SpecialPurpose,
            'E' => VehicleType::Tractor,
            'F' => VehicleType::Agricultural,
            'G' => VehicleType::Motorbike,
            'K' => VehicleType::Moped,
            'L' => VehicleType::Trailer,
            'M' => VehicleType::Motorcycle,
            'R' => VehicleType::ThreeWheeler,
            'S' => VehicleType::Pickup,
            'T' => VehicleType::Construction,
            'V' => VehicleType::Tourist,
            _ => VehicleType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Truck => "truck",
            VehicleType::Bus => "bus",
            VehicleType::SpecialPurpose => "special_purpose",
            VehicleType::Tractor => "tractor",
            VehicleType::Agricultural => "agricultural",
            VehicleType::Motorbike => "motorbike",
            VehicleType::Moped => "moped",
            VehicleType::Trailer => "trailer",
            VehicleType::Motorcycle => "motorcycle",
            VehicleType::ThreeWheeler => "three_wheeler",
            VehicleType::Pickup => "pickup",
            VehicleType::Construction => "construction",
            VehicleType::Tourist => "tourist",
            VehicleType::Other => "other",
        }
    }

    /// Display name and description shown by the web client.
    pub fn info(&self) -> VehicleTypeInfo {
        let (name, description) = match self {
            VehicleType::Car => ("Xe con", "Xe ô tô con, xe sedan"),
            VehicleType::Truck => ("Xe tải", "Xe tải, xe chở hàng"),
            VehicleType::Bus => ("Xe khách", "Xe buýt, xe khách"),
            VehicleType::SpecialPurpose => ("Xe chuyên dùng", "Xe có công năng đặc biệt"),
            VehicleType::Tractor => ("Xe đầu kéo", "Xe đầu kéo, máy kéo"),
            VehicleType::Agricultural => ("Xe nông nghiệp", "Máy móc nông nghiệp"),
            VehicleType::Motorbike => ("Xe mô tô", "Xe mô tô hai bánh"),
            VehicleType::Moped => ("Xe gắn máy", "Xe gắn máy dung tích nhỏ"),
            VehicleType::Trailer => ("Rơ moóc", "Rơ moóc, sơ mi rơ moóc"),
            VehicleType::Motorcycle => ("Xe máy", "Xe máy"),
            VehicleType::ThreeWheeler => ("Xe ba bánh", "Xe ba bánh"),
            VehicleType::Pickup => ("Xe bán tải", "Xe bán tải"),
            VehicleType::Construction => ("Xe công trình", "Xe máy thi công"),
            VehicleType::Tourist => ("Xe du lịch", "Xe chở khách du lịch"),
            VehicleType::Other => ("Khác", "Loại phương tiện khác"),
        };
        VehicleTypeInfo {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleTypeInfo {
    pub name: String,
    pub description: String,
}

/// Dominant background color of a plate crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateColor {
    White,
    Yellow,
    Blue,
    Red,
}

impl PlateColor {
    pub fn plate_type(&self) -> PlateType {
        match self {
            PlateColor::White => PlateType::Personal,
            PlateColor::Yellow => PlateType::Commercial,
            PlateColor::Blue => PlateType::Government,
            PlateColor::Red => PlateType::Military,
        }
    }
}

/// Color-based plate category estimate with the histogram peaks it came from.
///
/// Hue is on the 8-bit half-degree scale (0..180), saturation and value on 0..256.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorEstimate {
    pub color: PlateColor,
    pub plate_type: PlateType,
    pub dominant_hue: u8,
    pub dominant_saturation: u8,
    pub dominant_value: u8,
}

/// Structured decoding of one recognized plate string.
///
/// When `is_valid` is false every derived field is empty and only `original`
/// and `normalized` carry data (plus a diplomatic/international tag, which is
/// assigned independently of structural validity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateRecord {
    pub original: String,
    pub normalized: String,
    pub province_code: String,
    pub province_name: String,
    pub serial: String,
    pub number: String,
    pub vehicle_type: Option<VehicleType>,
    #[serde(rename = "plate_type_info")]
    pub vehicle_type_info: Option<VehicleTypeInfo>,
    pub plate_type: Option<PlateType>,
    pub detected_color: Option<PlateColor>,
    #[serde(rename = "is_valid_format")]
    pub is_valid: bool,
    #[serde(rename = "format_description")]
    pub format: String,
}

impl PlateRecord {
    /// Record for text that matched no grammar.
    pub fn unparsed(original: impl Into<String>, normalized: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            normalized: normalized.into(),
            province_code: String::new(),
            province_name: String::new(),
            serial: String::new(),
            number: String::new(),
            vehicle_type: None,
            vehicle_type_info: None,
            plate_type: None,
            detected_color: None,
            is_valid: false,
            format: String::new(),
        }
    }
}

/// Axis-aligned box in pixel coordinates, `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Clip to an image of the given size, `None` when nothing is left.
    pub fn clip(&self, width: u32, height: u32) -> Option<Self> {
        let clipped = Self {
            x1: self.x1.min(width),
            y1: self.y1.min(height),
            x2: self.x2.min(width),
            y2: self.y2.min(height),
        };
        (clipped.width() > 0 && clipped.height() > 0).then_some(clipped)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = if x2 > x1 && y2 > y1 {
            (x2 - x1) as f32 * (y2 - y1) as f32
        } else {
            0.0
        };

        let union = self.area() as f32 + other.area() as f32 - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    pub fn to_array(&self) -> [u32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Result of analyzing a single plate crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropAnalysis {
    pub plate_number: String,
    /// Detector confidence for the crop.
    pub confidence: f32,
    /// Confidence of the winning recognition candidate.
    pub confidence_ocr: f32,
    pub plate_analysis: Option<PlateRecord>,
    pub color_estimate: ColorEstimate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_variant: Option<String>,
}

/// One located plate in a processed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateDetection {
    pub plate_number: String,
    pub confidence_detection: f32,
    pub confidence_ocr: f32,
    pub bounding_box: [u32; 4],
    pub plate_analysis: Option<PlateRecord>,
    pub color_estimate: Option<ColorEstimate>,
    pub ocr_engine_used: Option<String>,
}

/// Response of the image processing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessImageResponse {
    pub detections: Vec<PlateDetection>,
    pub processed_image_url: Option<String>,
    pub error: Option<String>,
}

/// Request body for parsing a plate string without an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRequest {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_lookup_is_total() {
        assert_eq!(VehicleType::from_serial_letter('A'), VehicleType::Car);
        assert_eq!(VehicleType::from_serial_letter('g'), VehicleType::Motorbike);
        assert_eq!(VehicleType::from_serial_letter('V'), VehicleType::Tourist);

        for letter in ['H', 'N', 'Q', 'Z', '7', '-'] {
            assert_eq!(VehicleType::from_serial_letter(letter), VehicleType::Other);
        }
    }

    #[test]
    fn test_color_to_plate_type() {
        assert_eq!(PlateColor::White.plate_type(), PlateType::Personal);
        assert_eq!(PlateColor::Yellow.plate_type(), PlateType::Commercial);
        assert_eq!(PlateColor::Blue.plate_type(), PlateType::Government);
        assert_eq!(PlateColor::Red.plate_type(), PlateType::Military);
    }

    #[test]
    fn test_bounding_box_clip() {
        let bbox = BoundingBox::new(90, 40, 140, 80);
        assert_eq!(bbox.clip(120, 60), Some(BoundingBox::new(90, 40, 120, 60)));

        let outside = BoundingBox::new(200, 200, 260, 240);
        assert_eq!(outside.clip(120, 60), None);
    }

    #[test]
    fn test_bounding_box_iou() {
        let a = BoundingBox::new(10, 10, 60, 30);
        let b = BoundingBox::new(30, 15, 80, 35);
        let iou = a.iou(&b);
        assert!(iou > 0.0 && iou < 1.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&BoundingBox::new(100, 100, 150, 120)), 0.0);
    }

    #[test]
    fn test_plate_record_wire_names() {
        let record = PlateRecord::unparsed("??###", "??###");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["is_valid_format"], false);
        assert_eq!(json["format_description"], "");
        assert!(json["plate_type_info"].is_null());
        assert_eq!(json["original"], "??###");
    }
}

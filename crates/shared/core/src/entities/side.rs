use serde::{Deserialize, Serialize};

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Wire value of tag 54
    pub fn code(&self) -> &'static str {
        match self {
            Side::Buy => "1",
            Side::Sell => "2",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(Side::Buy),
            "2" => Some(Side::Sell),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_codes() {
        assert_eq!(Side::Buy.code(), "1");
        assert_eq!(Side::from_code("2"), Some(Side::Sell));
        assert_eq!(Side::from_code("3"), None);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }
}

/// Symbol identifier for a tradeable instrument
pub type Symbol = String;

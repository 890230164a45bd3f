//! metric views, recorded through the global `metrics` recorder

pub const RESULT_OK: &str = "ok";
pub const RESULT_MISS: &str = "miss";
pub const RESULT_ERR: &str = "err";

#[derive(Clone, Copy, Default)]
pub struct PieceStoreView {}

impl PieceStoreView {
    pub fn get(self, result: &'static str) {
        ::metrics::increment_counter!("piece_store_get", "result" => result);
    }

    pub fn put(self, result: &'static str) {
        ::metrics::increment_counter!("piece_store_put", "result" => result);
    }
}

#[derive(Clone, Copy, Default)]
pub struct SectorView {}

impl SectorView {
    pub fn removed(self) {
        ::metrics::increment_counter!("sector_removed");
    }
}

#[derive(Clone, Copy, Default)]
pub struct View {
    pub piece_store: PieceStoreView,
    pub sector: SectorView,
}

pub static VIEW: View = View {
    piece_store: PieceStoreView {},
    sector: SectorView {},
};

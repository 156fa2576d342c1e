use serde::{Deserialize, Serialize};

/// Identifies one of the two generation buffers of a double-buffered quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(u8);

impl SlotId {
    pub const ZERO: SlotId = SlotId(0);
    pub const ONE: SlotId = SlotId(1);

    /// Both slots in index order.
    pub const ALL: [SlotId; 2] = [SlotId::ZERO, SlotId::ONE];

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The slot that is not `self`.
    pub fn other(self) -> SlotId {
        SlotId(self.0 ^ 1)
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot{}", self.0)
    }
}

/// Which slot is read and which is written by the compute pass this frame.
///
/// `Even` reads slot 0 and writes slot 1; `Odd` reads slot 1 and writes slot 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parity {
    #[default]
    Even,
    Odd,
}

impl Parity {
    pub const ALL: [Parity; 2] = [Parity::Even, Parity::Odd];

    pub fn bit(self) -> u8 {
        match self {
            Parity::Even => 0,
            Parity::Odd => 1,
        }
    }

    pub fn index(self) -> usize {
        self.bit() as usize
    }

    pub fn flipped(self) -> Parity {
        match self {
            Parity::Even => Parity::Odd,
            Parity::Odd => Parity::Even,
        }
    }

    /// Slot the compute pass reads.
    pub fn input(self) -> SlotId {
        match self {
            Parity::Even => SlotId::ZERO,
            Parity::Odd => SlotId::ONE,
        }
    }

    /// Slot the compute pass writes and the render pass then reads.
    pub fn output(self) -> SlotId {
        self.input().other()
    }
}

impl std::fmt::Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bit())
    }
}

/// Errors from describing slot layouts and workgroups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("item count must be non-zero")]
    ZeroItems,
    #[error("item stride must be non-zero")]
    ZeroStride,
    #[error("workgroup size must be non-zero")]
    ZeroWorkgroup,
    #[error("slot size overflows: {item_count} items of {item_stride} bytes")]
    Overflow { item_count: u32, item_stride: u64 },
    #[error("{width}x{height} grid has more items than a slot can index")]
    GridTooLarge { width: u32, height: u32 },
}

/// Shape of one slot: `item_count` items of `item_stride` bytes each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLayout {
    item_count: u32,
    item_stride: u64,
}

impl SlotLayout {
    pub fn new(item_count: u32, item_stride: u64) -> Result<Self, LayoutError> {
        if item_count == 0 {
            return Err(LayoutError::ZeroItems);
        }
        if item_stride == 0 {
            return Err(LayoutError::ZeroStride);
        }
        if (item_count as u64).checked_mul(item_stride).is_none() {
            return Err(LayoutError::Overflow {
                item_count,
                item_stride,
            });
        }
        Ok(Self {
            item_count,
            item_stride,
        })
    }

    /// Layout for a `width` x `height` grid of items, one per cell.
    pub fn grid(width: u32, height: u32, item_stride: u64) -> Result<Self, LayoutError> {
        let item_count = width
            .checked_mul(height)
            .ok_or(LayoutError::GridTooLarge { width, height })?;
        Self::new(item_count, item_stride)
    }

    /// Layout for `item_count` items of type `T`.
    pub fn of<T>(item_count: u32) -> Result<Self, LayoutError> {
        Self::new(item_count, std::mem::size_of::<T>() as u64)
    }

    pub fn item_count(&self) -> u32 {
        self.item_count
    }

    pub fn item_stride(&self) -> u64 {
        self.item_stride
    }

    /// Total bytes of one slot. Checked at construction.
    pub fn byte_size(&self) -> u64 {
        self.item_count as u64 * self.item_stride
    }
}

/// Number of invocations in one (1-D) compute workgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct WorkgroupSize(u32);

impl WorkgroupSize {
    pub fn new(size: u32) -> Result<Self, LayoutError> {
        if size == 0 {
            return Err(LayoutError::ZeroWorkgroup);
        }
        Ok(Self(size))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for WorkgroupSize {
    fn default() -> Self {
        Self(64)
    }
}

impl TryFrom<u32> for WorkgroupSize {
    type Error = LayoutError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorkgroupSize> for u32 {
    fn from(value: WorkgroupSize) -> Self {
        value.0
    }
}

impl std::fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workgroups needed to cover `item_count` items. The last group may be partial;
/// kernels bounds-check the tail.
pub fn dispatch_groups(item_count: u32, workgroup: WorkgroupSize) -> u32 {
    item_count.div_ceil(workgroup.get())
}

/// Convolution effect applied by the image-filter demo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFilter {
    #[default]
    Blur,
    Emboss,
    EdgeDetect,
    Sharpen,
}

impl ImageFilter {
    pub const ALL: [ImageFilter; 4] = [
        ImageFilter::Blur,
        ImageFilter::Emboss,
        ImageFilter::EdgeDetect,
        ImageFilter::Sharpen,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ImageFilter::Blur => "blur",
            ImageFilter::Emboss => "emboss",
            ImageFilter::EdgeDetect => "edgedetect",
            ImageFilter::Sharpen => "sharpen",
        }
    }

    pub fn index(self) -> usize {
        match self {
            ImageFilter::Blur => 0,
            ImageFilter::Emboss => 1,
            ImageFilter::EdgeDetect => 2,
            ImageFilter::Sharpen => 3,
        }
    }
}

impl std::str::FromStr for ImageFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageFilter::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| format!("unknown filter '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_alternates_slots() {
        assert_eq!(Parity::Even.input(), SlotId::ZERO);
        assert_eq!(Parity::Even.output(), SlotId::ONE);
        assert_eq!(Parity::Odd.input(), SlotId::ONE);
        assert_eq!(Parity::Odd.output(), SlotId::ZERO);
        assert_eq!(Parity::Even.flipped().flipped(), Parity::Even);
    }

    #[test]
    fn slot_other_is_involution() {
        for slot in SlotId::ALL {
            assert_ne!(slot.other(), slot);
            assert_eq!(slot.other().other(), slot);
        }
    }

    #[test]
    fn dispatch_grid_exact_multiple() {
        let wg = WorkgroupSize::new(64).unwrap();
        assert_eq!(dispatch_groups(8192, wg), 128);
    }

    #[test]
    fn dispatch_grid_rounds_up_tail() {
        let wg = WorkgroupSize::new(64).unwrap();
        assert_eq!(dispatch_groups(8200, wg), 129);
        assert_eq!(dispatch_groups(1, wg), 1);
    }

    #[test]
    fn layout_rejects_degenerate_shapes() {
        assert_eq!(SlotLayout::new(0, 16), Err(LayoutError::ZeroItems));
        assert_eq!(SlotLayout::new(4, 0), Err(LayoutError::ZeroStride));
        assert!(matches!(
            SlotLayout::new(u32::MAX, u64::MAX),
            Err(LayoutError::Overflow { .. })
        ));
        assert_eq!(WorkgroupSize::new(0), Err(LayoutError::ZeroWorkgroup));
    }

    #[test]
    fn grid_layout_checks_cell_count() {
        let layout = SlotLayout::grid(512, 256, 4).unwrap();
        assert_eq!(layout.item_count(), 512 * 256);
        assert_eq!(
            SlotLayout::grid(70_000, 70_000, 4),
            Err(LayoutError::GridTooLarge {
                width: 70_000,
                height: 70_000
            })
        );
        assert_eq!(SlotLayout::grid(0, 16, 4), Err(LayoutError::ZeroItems));
    }

    #[test]
    fn layout_byte_size() {
        let layout = SlotLayout::of::<[f32; 4]>(8192).unwrap();
        assert_eq!(layout.item_stride(), 16);
        assert_eq!(layout.byte_size(), 8192 * 16);
    }

    #[test]
    fn filter_parses_by_name() {
        for filter in ImageFilter::ALL {
            assert_eq!(filter.name().parse::<ImageFilter>(), Ok(filter));
        }
        assert!("gaussian".parse::<ImageFilter>().is_err());
    }
}

use crate::shared::region::Region;

/// Accepted windows of one frame, in discovery order: levels in scan-mode
/// order, row-major within a level.
///
/// Overlapping windows are kept as found; [`ResultSet::grouped`] is an
/// explicit downstream step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultSet {
    regions: Vec<Region>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, region: Region) {
        self.regions.push(region);
    }

    pub fn extend(&mut self, regions: impl IntoIterator<Item = Region>) {
        self.regions.extend(regions);
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn into_regions(self) -> Vec<Region> {
        self.regions
    }

    /// Greedy IoU de-duplication. Earlier windows win, so the result depends
    /// on the scan mode that produced this set.
    pub fn grouped(&self, iou_threshold: f64) -> ResultSet {
        ResultSet {
            regions: Region::deduplicate(&self.regions, iou_threshold),
        }
    }
}

impl FromIterator<Region> for ResultSet {
    fn from_iter<I: IntoIterator<Item = Region>>(iter: I) -> Self {
        Self {
            regions: iter.into_iter().collect(),
        }
    }
}

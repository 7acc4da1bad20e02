use crate::viz::ChartKind;

/// Section visibility state surviving across evaluation cycles. A typed
/// record with named fields instead of a string-keyed map, so a stale or
/// misspelled key cannot exist.
///
/// The filter section flips on its toggle action. The cleaning and chart
/// sections hide one-way: there is no re-show affordance other than
/// re-triggering the driving control, matching the observed behavior of the
/// driving UI.
#[derive(Debug, Clone)]
pub struct ToggleStateStore {
    filter_visible: bool,
    cleaning_visible: bool,
    chart_hidden: [bool; ChartKind::ALL.len()],
}

impl Default for ToggleStateStore {
    fn default() -> Self {
        ToggleStateStore {
            // Filter and cleaning start hidden; charts start visible until
            // explicitly hidden.
            filter_visible: false,
            cleaning_visible: false,
            chart_hidden: [false; ChartKind::ALL.len()],
        }
    }
}

impl ToggleStateStore {
    pub fn toggle_filter(&mut self) {
        self.filter_visible = !self.filter_visible;
    }

    pub fn hide_filter(&mut self) {
        self.filter_visible = false;
    }

    pub fn filter_visible(&self) -> bool {
        self.filter_visible
    }

    pub fn show_cleaning(&mut self) {
        self.cleaning_visible = true;
    }

    pub fn hide_cleaning(&mut self) {
        self.cleaning_visible = false;
    }

    pub fn cleaning_visible(&self) -> bool {
        self.cleaning_visible
    }

    pub fn hide_chart(&mut self, kind: ChartKind) {
        self.chart_hidden[kind.index()] = true;
    }

    pub fn chart_hidden(&self, kind: ChartKind) -> bool {
        self.chart_hidden[kind.index()]
    }

    /// Loading a new table invalidates toggles tied to the old schema; they
    /// fall back to their defaults instead of crashing on stale sections.
    pub fn reset(&mut self) {
        *self = ToggleStateStore::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let toggles = ToggleStateStore::default();
        assert!(!toggles.filter_visible());
        assert!(!toggles.cleaning_visible());
        for kind in ChartKind::ALL {
            assert!(!toggles.chart_hidden(kind));
        }
    }

    #[test]
    fn filter_toggle_flips_and_hide_forces() {
        let mut toggles = ToggleStateStore::default();
        toggles.toggle_filter();
        assert!(toggles.filter_visible());
        toggles.toggle_filter();
        assert!(!toggles.filter_visible());
        toggles.toggle_filter();
        toggles.hide_filter();
        assert!(!toggles.filter_visible());
    }

    #[test]
    fn chart_hide_is_one_way_per_kind() {
        let mut toggles = ToggleStateStore::default();
        toggles.hide_chart(ChartKind::Heatmap);
        assert!(toggles.chart_hidden(ChartKind::Heatmap));
        assert!(!toggles.chart_hidden(ChartKind::Bar));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut toggles = ToggleStateStore::default();
        toggles.toggle_filter();
        toggles.show_cleaning();
        toggles.hide_chart(ChartKind::Pie);
        toggles.reset();
        assert!(!toggles.filter_visible());
        assert!(!toggles.cleaning_visible());
        assert!(!toggles.chart_hidden(ChartKind::Pie));
    }
}

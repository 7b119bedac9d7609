use egui::{Color32, FontFamily, FontId, Rounding, Stroke, Style, TextStyle, Visuals};

pub const BG_PAGE: Color32 = Color32::from_rgb(14, 17, 22);
pub const BG_PANEL: Color32 = Color32::from_rgb(20, 24, 31);
pub const BG_CARD: Color32 = Color32::from_rgb(28, 33, 42);
pub const BG_WIDGET: Color32 = Color32::from_rgb(34, 40, 51);
pub const BG_WIDGET_HOVER: Color32 = Color32::from_rgb(44, 52, 66);
pub const BG_WIDGET_ACTIVE: Color32 = Color32::from_rgb(54, 64, 82);

pub const TEXT_PRIMARY: Color32 = Color32::from_rgb(200, 205, 214);
pub const TEXT_MUTED: Color32 = Color32::from_rgb(120, 128, 140);
pub const TEXT_BRIGHT: Color32 = Color32::from_rgb(236, 239, 244);

pub const ACCENT_TEAL: Color32 = Color32::from_rgb(38, 166, 154);
pub const ACCENT_BLUE: Color32 = Color32::from_rgb(66, 133, 244);
pub const ACCENT_AMBER: Color32 = Color32::from_rgb(230, 162, 60);
pub const ACCENT_RED: Color32 = Color32::from_rgb(214, 69, 65);

pub const BORDER_SUBTLE: Color32 = Color32::from_rgb(48, 55, 68);

/// Page background behind the model regions, as linear RGB for the swapchain clear.
pub fn page_clear() -> [f32; 3] {
    let [r, g, b, _] = egui::Rgba::from(BG_PAGE).to_array();
    [r, g, b]
}

fn widget(bg: Color32, stroke: Color32, fg: Color32, expansion: f32) -> egui::style::WidgetVisuals {
    egui::style::WidgetVisuals {
        bg_fill: bg,
        weak_bg_fill: bg,
        bg_stroke: Stroke::new(1.0, stroke),
        rounding: Rounding::same(5.0),
        fg_stroke: Stroke::new(1.0, fg),
        expansion,
    }
}

pub fn apply_theme(ctx: &egui::Context) {
    let mut style = Style::default();

    let mut visuals = Visuals::dark();
    visuals.override_text_color = Some(TEXT_PRIMARY);
    visuals.widgets.noninteractive = widget(BG_CARD, BORDER_SUBTLE, TEXT_MUTED, 0.0);
    visuals.widgets.inactive = widget(BG_WIDGET, BORDER_SUBTLE, TEXT_PRIMARY, 0.0);
    visuals.widgets.hovered = widget(BG_WIDGET_HOVER, ACCENT_TEAL, TEXT_BRIGHT, 1.0);
    visuals.widgets.active = widget(BG_WIDGET_ACTIVE, ACCENT_TEAL, TEXT_BRIGHT, 1.0);
    visuals.widgets.open = widget(BG_WIDGET_ACTIVE, ACCENT_BLUE, TEXT_BRIGHT, 0.0);
    visuals.selection = egui::style::Selection {
        bg_fill: ACCENT_TEAL.gamma_multiply(0.4),
        stroke: Stroke::new(1.0, ACCENT_TEAL),
    };
    visuals.hyperlink_color = ACCENT_BLUE;
    visuals.warn_fg_color = ACCENT_AMBER;
    visuals.error_fg_color = ACCENT_RED;
    visuals.window_fill = BG_PANEL;
    visuals.panel_fill = BG_PAGE;
    visuals.extreme_bg_color = BG_PAGE;
    visuals.window_rounding = Rounding::same(8.0);
    visuals.window_stroke = Stroke::new(1.0, BORDER_SUBTLE);
    style.visuals = visuals;

    style.spacing.item_spacing = egui::vec2(8.0, 6.0);
    style.spacing.window_margin = egui::Margin::same(12.0);
    style.spacing.button_padding = egui::vec2(10.0, 5.0);

    style.text_styles = [
        (TextStyle::Small, FontId::new(11.0, FontFamily::Proportional)),
        (TextStyle::Body, FontId::new(14.0, FontFamily::Proportional)),
        (TextStyle::Button, FontId::new(14.0, FontFamily::Proportional)),
        (TextStyle::Heading, FontId::new(20.0, FontFamily::Proportional)),
        (TextStyle::Monospace, FontId::new(13.0, FontFamily::Monospace)),
    ]
    .into();

    ctx.set_style(style);
}

use egui::{Align2, Color32, Context, FontId, PointerButton, Rect, RichText, Sense, Ui, pos2, vec2};
use glam::Vec2;

use implant3d::patient::{BoneType, format_dimension, format_measurement};
use implant3d::renderer::ElementId;
use implant3d::runtime::{PointerEvent, SessionState, ViewEvent};
use implant3d::{Availability, Region, ViewerPage};

use crate::ui::state::{Screen, UiState};
use crate::ui::theme::*;

#[derive(Default)]
pub struct UiActions {
    pub select_bone: Option<BoneType>,
    pub open_ar: bool,
    pub enter_ar: bool,
    pub exit_ar: bool,
    pub back: bool,
}

/// What a model region reported during layout: its size in physical pixels
/// and the pointer input it received.
pub struct RegionInput {
    pub region: Region,
    pub size: (u32, u32),
    pub events: Vec<ViewEvent>,
}

/// Maps a surface's drawing element to the egui image showing it.
pub type TextureLookup<'a> = &'a dyn Fn(ElementId) -> Option<egui::TextureId>;

pub fn draw_patient_page(
    ctx: &Context,
    page: &ViewerPage,
    state: &UiState,
    textures: TextureLookup<'_>,
) -> (UiActions, Vec<RegionInput>) {
    let mut actions = UiActions::default();
    let mut inputs = Vec::new();
    let Some(detail) = page.patient_detail() else {
        return (actions, inputs);
    };
    let summary = &detail.summary;

    egui::TopBottomPanel::top("patient_header")
        .frame(egui::Frame::default().fill(BG_PANEL).inner_margin(16.0))
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(RichText::new(&summary.name).strong().color(TEXT_BRIGHT));
                ui.label(RichText::new(format!("#{}", summary.id)).color(TEXT_MUTED).size(11.0));
            });
            ui.add_space(8.0);
            egui::Grid::new("patient_facts")
                .num_columns(2)
                .spacing([24.0, 4.0])
                .show(ui, |ui| {
                    fact(ui, "Age", summary.age.to_string());
                    fact(ui, "Screw Height", format_dimension(summary.height_millimeter));
                    fact(ui, "Screw Width", format_dimension(summary.width_millimeter));
                    fact(
                        ui,
                        "Bone Density (g/cm²)",
                        format_measurement(summary.bone_density_gram_per_centimeter_sq),
                    );
                });
            if let Some(notice) = &state.notice {
                ui.add_space(4.0);
                ui.label(RichText::new(notice).color(ACCENT_AMBER));
            }
        });

    egui::SidePanel::left("implant_panel")
        .resizable(true)
        .default_width(420.0)
        .min_width(240.0)
        .frame(egui::Frame::default().fill(BG_PANEL).inner_margin(12.0))
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                section_header(ui, "IMPLANT");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let button = accent_button("View in AR", ACCENT_TEAL);
                    if ui.add_enabled(page.ar_target().is_some(), button).clicked() {
                        actions.open_ar = true;
                    }
                });
            });
            ui.add_space(8.0);
            inputs.push(model_region(ui, page, Region::Implant, textures));
        });

    egui::CentralPanel::default()
        .frame(egui::Frame::default().fill(BG_PAGE).inner_margin(12.0))
        .show(ctx, |ui| {
            section_header(ui, "ANATOMY");
            ui.horizontal(|ui| {
                for bone in BoneType::ALL {
                    let selected = page.selected_bone() == bone;
                    let button = egui::Button::new(
                        RichText::new(bone.label()).color(if selected { BG_PAGE } else { TEXT_PRIMARY }),
                    )
                    .fill(if selected { ACCENT_TEAL } else { BG_WIDGET })
                    .min_size(vec2(96.0, 28.0));
                    let available = detail.model_urls.is_available(bone);
                    if ui.add_enabled(available, button).clicked() && !selected {
                        actions.select_bone = Some(bone);
                    }
                }
            });
            ui.add_space(8.0);
            inputs.push(model_region(ui, page, Region::Anatomy, textures));
        });

    if state.show_help {
        draw_help_overlay(ctx, state.screen);
    }

    (actions, inputs)
}

pub fn draw_ar_page(
    ctx: &Context,
    page: &ViewerPage,
    state: &UiState,
    textures: TextureLookup<'_>,
) -> (UiActions, Vec<RegionInput>) {
    let mut actions = UiActions::default();
    let mut inputs = Vec::new();
    let session = page.session_state().unwrap_or(SessionState::Inactive);

    if session == SessionState::Active {
        // The device frame is already in the swapchain; only the overlay is drawn.
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let ppp = ui.ctx().pixels_per_point();
                let rect = ui.max_rect();
                inputs.push(RegionInput {
                    region: Region::Immersive,
                    size: to_pixels(rect, ppp),
                    events: Vec::new(),
                });
            });
        egui::Area::new(egui::Id::new("ar_overlay"))
            .anchor(Align2::RIGHT_TOP, vec2(-16.0, 16.0))
            .show(ctx, |ui| {
                if ui.add(accent_button("Exit AR", ACCENT_RED)).clicked() {
                    actions.exit_ar = true;
                }
            });
        return (actions, inputs);
    }

    egui::TopBottomPanel::top("ar_header")
        .frame(egui::Frame::default().fill(BG_PANEL).inner_margin(16.0))
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Back").clicked() {
                    actions.back = true;
                }
                ui.heading(RichText::new("Implant in AR").strong().color(TEXT_BRIGHT));
            });
            if let Some(handoff) = page.handoff() {
                ui.label(
                    RichText::new(format!(
                        "Height {}  |  Radius {}",
                        format_dimension(Some(handoff.height_mm)),
                        format_dimension(Some(handoff.radius_mm)),
                    ))
                    .color(TEXT_MUTED),
                );
            }
            ui.add_space(6.0);

            if !page.immersive_supported() {
                ui.label(RichText::new("AR not available").color(ACCENT_AMBER));
            } else {
                let starting = session == SessionState::Requesting;
                let text = if starting { "Starting AR..." } else { "Enter AR" };
                if ui.add_enabled(!starting, accent_button(text, ACCENT_TEAL)).clicked() {
                    actions.enter_ar = true;
                }
            }
            if let Some(notice) = &state.notice {
                ui.label(RichText::new(notice).color(ACCENT_AMBER));
            }
        });

    egui::CentralPanel::default()
        .frame(egui::Frame::default().fill(BG_PAGE).inner_margin(12.0))
        .show(ctx, |ui| {
            inputs.push(model_region(ui, page, Region::Immersive, textures));
        });

    if state.show_help {
        draw_help_overlay(ctx, state.screen);
    }

    (actions, inputs)
}

/// Lays out one model region: the surface's image, dimension labels, and a
/// card in place of the model when there is nothing to show.
fn model_region(ui: &mut Ui, page: &ViewerPage, region: Region, textures: TextureLookup<'_>) -> RegionInput {
    let size = ui.available_size().max(vec2(1.0, 1.0));
    let (rect, response) = ui.allocate_exact_size(size, Sense::click_and_drag());
    let ppp = ui.ctx().pixels_per_point();
    let painter = ui.painter_at(rect);

    match page.view(region) {
        Some(view) if view.availability() != Availability::NotAvailable => {
            let surface = view.surface();
            if let Some(texture) = textures(surface.element()) {
                let uv = Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0));
                painter.image(texture, rect, uv, Color32::WHITE);
            }
            if view.availability() == Availability::Loading {
                ui.put(
                    Rect::from_center_size(rect.center(), vec2(28.0, 28.0)),
                    egui::Spinner::new(),
                );
            }
            for label in surface.scene().labels() {
                let Some(ndc) = surface.camera().project(label.anchor) else {
                    continue;
                };
                let pos = pos2(
                    rect.left() + (ndc.x + 1.0) * 0.5 * rect.width(),
                    rect.top() + (1.0 - ndc.y) * 0.5 * rect.height(),
                );
                painter.text(pos, Align2::CENTER_BOTTOM, &label.text, FontId::proportional(13.0), TEXT_BRIGHT);
            }
        }
        _ => {
            painter.rect_filled(rect.shrink(8.0), 8.0, BG_CARD);
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                "Model not available",
                FontId::proportional(16.0),
                TEXT_MUTED,
            );
        }
    }

    let mut events = Vec::new();
    let drag = response.drag_delta() * ppp;
    let drag = Vec2::new(drag.x, drag.y);
    if response.dragged_by(PointerButton::Primary) && drag != Vec2::ZERO {
        events.push(ViewEvent::Pointer(PointerEvent::Rotate(drag)));
    }
    if response.dragged_by(PointerButton::Secondary) && drag != Vec2::ZERO {
        events.push(ViewEvent::Pointer(PointerEvent::Pan(drag)));
    }
    if response.hovered() {
        let scroll = ui.input(|i| i.smooth_scroll_delta.y);
        if scroll != 0.0 {
            events.push(ViewEvent::Pointer(PointerEvent::Wheel(scroll)));
        }
    }

    RegionInput {
        region,
        size: to_pixels(rect, ppp),
        events,
    }
}

fn to_pixels(rect: Rect, pixels_per_point: f32) -> (u32, u32) {
    (
        (rect.width() * pixels_per_point).round().max(0.0) as u32,
        (rect.height() * pixels_per_point).round().max(0.0) as u32,
    )
}

fn fact(ui: &mut Ui, name: &str, value: String) {
    ui.label(RichText::new(name).color(TEXT_MUTED));
    ui.label(RichText::new(value).color(TEXT_BRIGHT));
    ui.end_row();
}

fn section_header(ui: &mut Ui, text: &str) {
    ui.label(RichText::new(text).color(TEXT_MUTED).size(11.0).strong());
}

fn accent_button(text: &str, fill: Color32) -> egui::Button<'static> {
    egui::Button::new(RichText::new(text.to_owned()).color(BG_PAGE).strong())
        .fill(fill)
        .min_size(vec2(110.0, 30.0))
}

pub fn draw_help_overlay(ctx: &Context, screen: Screen) {
    let hint = match screen {
        Screen::Patient => "Drag - Rotate | Right drag - Pan | Scroll - Zoom | Arrows, W/S - Move anatomy",
        Screen::Ar => "Enter AR to place the implant in front of you",
    };
    egui::Area::new(egui::Id::new("help_overlay"))
        .anchor(Align2::LEFT_BOTTOM, vec2(12.0, -12.0))
        .show(ctx, |ui| {
            egui::Frame::default()
                .fill(Color32::from_black_alpha(180))
                .rounding(6.0)
                .inner_margin(10.0)
                .show(ui, |ui| {
                    ui.style_mut().override_font_id = Some(FontId::new(11.0, egui::FontFamily::Monospace));
                    ui.label(RichText::new(hint).color(TEXT_MUTED));
                });
        });
}

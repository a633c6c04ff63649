use eframe::egui;
use egui_plot::{Line, Plot, PlotPoints, Points};

use sixdof_autopilot::dynamics::state::{AircraftState, SimConfig};
use sixdof_autopilot::gnc::AutopilotControls;
use sixdof_autopilot::io::FlightSummary;
use sixdof_autopilot::route::Route;
use sixdof_autopilot::sim;
use sixdof_autopilot::vehicle::presets;

fn main() -> eframe::Result {
    tracing_subscriber::fmt().init();

    let aircraft = presets::trainer();
    let route = presets::box_route();
    let config = SimConfig { dt: 0.01, max_time: 420.0 };
    let (trajectory, controls) = match presets::trainer_autopilot() {
        Ok(mut autopilot) => sim::simulate_with(&aircraft, &route, &mut autopilot, &config),
        Err(e) => {
            tracing::error!(error = %e, "built-in trainer tuning failed to load");
            (Vec::new(), Vec::new())
        }
    };
    let summary = FlightSummary::from_trajectory(&trajectory);

    let app = SimViz { name: aircraft.name, trajectory, controls, route, summary };
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };
    eframe::run_native("Autopilot Route Flight", options, Box::new(|_| Ok(Box::new(app))))
}

struct SimViz {
    name: String,
    trajectory: Vec<AircraftState>,
    controls: Vec<AutopilotControls>,
    route: Route,
    summary: FlightSummary,
}

fn time_plot(ui: &mut egui::Ui, id: &str, label: &str, size: egui::Vec2, lines: Vec<(&str, PlotPoints)>) {
    ui.vertical(|ui| {
        ui.label(label);
        Plot::new(id)
            .width(size.x)
            .height(size.y)
            .x_axis_label("Time (s)")
            .show(ui, |plot_ui| {
                for (name, points) in lines {
                    plot_ui.line(Line::new(name, points));
                }
            });
    });
}

impl eframe::App for SimViz {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let step = (self.trajectory.len() / 2000).max(1);
        let sampled: Vec<(&AircraftState, &AutopilotControls)> =
            self.trajectory.iter().zip(&self.controls).step_by(step).collect();

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.heading(format!("Aircraft: {}", self.name));
            ui.label(format!(
                "Waypoints: {}  |  Distance: {:.1} km  |  Max bank: {:.0} deg  |  Flight: {:.0} s",
                self.summary.waypoints_achieved,
                self.summary.ground_distance_m / 1000.0,
                self.summary.max_bank_deg,
                self.summary.flight_time_s,
            ));
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let available = ui.available_size();
            let half = egui::vec2(available.x / 2.0 - 8.0, available.y / 2.0 - 8.0);

            ui.horizontal(|ui| {
                let alt: PlotPoints = sampled.iter().map(|(s, _)| [s.time, s.position.alt]).collect();
                time_plot(ui, "altitude", "Altitude (m)", half, vec![("Altitude", alt)]);

                let hdg: PlotPoints = sampled.iter().map(|(s, _)| [s.time, s.heading.to_degrees()]).collect();
                let bank: PlotPoints = sampled.iter().map(|(s, _)| [s.time, s.roll.to_degrees()]).collect();
                time_plot(ui, "lateral", "Heading and bank (deg)", half, vec![("Heading", hdg), ("Bank", bank)]);
            });

            ui.horizontal(|ui| {
                let speed: PlotPoints = sampled.iter().map(|(s, _)| [s.time, s.speed]).collect();
                let thr: PlotPoints =
                    sampled.iter().map(|(s, c)| [s.time, 100.0 * c.throttle_military]).collect();
                time_plot(ui, "speed", "Speed (m/s) and throttle (%)", half, vec![("Speed", speed), ("Throttle", thr)]);

                // Ground track with the route overlaid
                ui.vertical(|ui| {
                    ui.label("Ground track (deg)");
                    let track: PlotPoints =
                        sampled.iter().map(|(s, _)| [s.position.lon, s.position.lat]).collect();
                    let waypoints: PlotPoints =
                        self.route.iter().map(|(_, wp)| [wp.position.lon, wp.position.lat]).collect();
                    Plot::new("track")
                        .width(half.x)
                        .height(half.y)
                        .x_axis_label("Longitude")
                        .data_aspect(1.0)
                        .show(ui, |plot_ui| {
                            plot_ui.line(Line::new("Track", track));
                            plot_ui.points(Points::new("Waypoints", waypoints).radius(4.0));
                        });
                });
            });
        });
    }
}

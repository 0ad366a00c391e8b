//! TUI rendering with ratatui.

use crate::model::bandwidth::{bandwidth_bar, simple_bar};
use crate::model::{SlotUsage, format_load};
use crate::ui::app::{App, ViewMode};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

/// Main render function.
pub fn render(frame: &mut Frame, app: &App) {
    // Main layout: content area + footer
    let outer_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    match app.view_mode {
        ViewMode::Domains => {
            let main_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
                .split(outer_chunks[0]);
            render_domains(frame, app, main_chunks[0]);
            render_details(frame, app, main_chunks[1]);
        }
        ViewMode::Steps => render_steps(frame, app, outer_chunks[0]),
    }

    render_footer(frame, outer_chunks[1]);

    if app.show_help {
        render_help(frame);
    }
}

fn usage_color(usage: &SlotUsage) -> Color {
    if usage.is_critical() {
        Color::Red
    } else if usage.is_high_usage() {
        Color::Yellow
    } else {
        Color::Green
    }
}

/// Render the domain list.
fn render_domains(frame: &mut Frame, app: &App, area: Rect) {
    let list_items: Vec<ListItem> = app
        .domain_items()
        .into_iter()
        .map(|item| {
            let mut style = if item.superspeed {
                Style::default().fg(Color::Magenta)
            } else {
                Style::default().fg(Color::Yellow)
            };
            if item.index == app.selected {
                style = style.bg(Color::DarkGray).add_modifier(Modifier::BOLD);
            }

            let percent = item.usage.peak_percent();
            let color = usage_color(&item.usage);
            let mut spans = vec![Span::styled(format!("{:<14}", item.label), style)];

            if app.show_bandwidth_bars {
                spans.push(Span::raw(" "));
                spans.push(Span::styled(
                    bandwidth_bar(percent, app.bar_width.min(20)),
                    Style::default().fg(color),
                ));
            }
            spans.push(Span::styled(
                format!(" {:.0}%", percent),
                Style::default().fg(color),
            ));
            spans.push(Span::styled(
                format!(" ({} eps)", item.members),
                Style::default().fg(Color::DarkGray),
            ));

            ListItem::new(Line::from(spans))
        })
        .collect();

    let title = format!(
        " Bandwidth Domains ({} USB3, {} USB2 ports) ",
        app.layout.usb3_ports, app.layout.usb2_ports
    );
    let list = List::new(list_items).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    frame.render_widget(list, area);
}

/// Render slot loads and members of the selected domain.
fn render_details(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = Vec::new();

    if let Some((index, domain)) = app.selected_domain() {
        let boundary = app.boundary(index);
        let usage = domain.usage(boundary);

        lines.push(Line::from(Span::styled(
            app.layout.describe(index),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(vec![
            Span::styled("Peak: ", Style::default().fg(Color::DarkGray)),
            Span::raw(format!(
                "{} at slot {}",
                format_load(usage.peak, boundary),
                usage.peak_slot
            )),
        ]));
        lines.push(Line::from(vec![
            Span::styled("Headroom: ", Style::default().fg(Color::DarkGray)),
            Span::raw(usage.headroom().to_string()),
        ]));
        lines.push(Line::from(""));

        lines.push(Line::from(Span::styled(
            format!("Endpoints ({})", domain.members().len()),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )));
        for entry in domain.members() {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(entry.id.to_string(), Style::default().fg(Color::White)),
                Span::styled(
                    format!(
                        " {} esit={} offset={} pkts={} budget={:?}",
                        entry.transfer_type,
                        entry.esit,
                        entry.offset,
                        entry.pkts,
                        entry.budget_table
                    ),
                    Style::default().fg(Color::DarkGray),
                ),
            ]));
        }
        lines.push(Line::from(""));

        lines.push(Line::from(Span::styled(
            "Slots",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )));
        for (slot, &bw) in domain.slots().iter().enumerate() {
            let slot_usage = SlotUsage::from_slots(&[bw], boundary);
            lines.push(Line::from(vec![
                Span::styled(format!("  {:>2} ", slot), Style::default().fg(Color::DarkGray)),
                Span::styled(
                    simple_bar(slot_usage.peak_percent(), app.bar_width),
                    Style::default().fg(usage_color(&slot_usage)),
                ),
                Span::raw(format!(" {}", bw)),
            ]));
        }
    } else {
        lines.push(Line::from("No bandwidth domains"));
    }

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(" Details (PgUp/PgDn) ")
                .borders(Borders::ALL),
        )
        .scroll((app.detail_scroll, 0));

    frame.render_widget(paragraph, area);
}

/// Render the replayed steps.
fn render_steps(frame: &mut Frame, app: &App, area: Rect) {
    let list_items: Vec<ListItem> = app
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let mut style = if step.contains("rejected") {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            if i == app.selected {
                style = style.bg(Color::DarkGray).add_modifier(Modifier::BOLD);
            }
            ListItem::new(Line::from(Span::styled(format!("{:>3} {}", i + 1, step), style)))
        })
        .collect();

    let list = List::new(list_items).block(
        Block::default()
            .title(format!(" Steps ({}) ", app.steps.len()))
            .borders(Borders::ALL),
    );

    frame.render_widget(list, area);
}

/// Render help overlay.
fn render_help(frame: &mut Frame) {
    let area = centered_rect(50, 60, frame.area());

    frame.render_widget(Clear, area);

    let help_text = vec![
        Line::from(Span::styled(
            "usbsch Help",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("  j/↓     Move down"),
        Line::from("  k/↑     Move up"),
        Line::from("  g/G     Top / bottom"),
        Line::from("  PgUp/Dn Scroll details"),
        Line::from("  d       Domain view"),
        Line::from("  s       Step view"),
        Line::from("  b       Toggle bandwidth bars"),
        Line::from("  ?       Toggle help"),
        Line::from("  q       Quit"),
    ];

    let paragraph = Paragraph::new(help_text)
        .block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .style(Style::default().bg(Color::Black))
        .wrap(Wrap { trim: false });

    frame.render_widget(paragraph, area);
}

/// Create a centered rect.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Render footer with keybindings.
fn render_footer(frame: &mut Frame, area: Rect) {
    let mut spans = Vec::new();
    for (key, what) in [
        ("j/k", " Nav  "),
        ("d/s", " View  "),
        ("b", " Bars  "),
        ("?", " Help  "),
        ("q", " Quit"),
    ] {
        spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(what));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));

    frame.render_widget(paragraph, area);
}

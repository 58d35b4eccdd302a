// 渲染模块：刷新定时 + 事件循环 + 显示区域计算

pub mod event_loop;
pub mod video_refresh;

pub use event_loop::run_event_loop;
pub use video_refresh::{RefreshAction, VideoRefresh};

use crate::core::{Frame, Rational};

/// 显示目标（窗口、纹理或者测试用的记录器）
pub trait PresentationSurface {
    /// 显示一帧
    fn display(&mut self, frame: &Frame);
}

/// 画面在目标区域中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// a * b / c，四舍五入
fn rescale_rnd(a: i64, b: i64, c: i64) -> i64 {
    if c == 0 {
        return 0;
    }
    let prod = a as i128 * b as i128;
    let c = c as i128;
    ((prod + c / 2) / c) as i64
}

/// 在 (left, top, max_width, max_height) 区域内按像素宽高比居中放置画面
///
/// 宽度和高度都取偶数；样本宽高比无效时按 1:1 处理
pub fn calculate_display_rect(
    left: i32,
    top: i32,
    max_width: i32,
    max_height: i32,
    pic_width: i32,
    pic_height: i32,
    pic_sar: Rational,
) -> DisplayRect {
    let sar = if pic_sar.num <= 0 || pic_sar.den <= 0 {
        Rational::new(1, 1)
    } else {
        pic_sar
    };
    if pic_width <= 0 || pic_height <= 0 {
        return DisplayRect {
            x: left,
            y: top,
            w: max_width.max(1),
            h: max_height.max(1),
        };
    }

    let aspect_num = sar.num as i64 * pic_width as i64;
    let aspect_den = sar.den as i64 * pic_height as i64;

    let mut height = max_height as i64;
    let mut width = rescale_rnd(height, aspect_num, aspect_den) & !1;
    if width > max_width as i64 {
        width = max_width as i64;
        height = rescale_rnd(width, aspect_den, aspect_num) & !1;
    }
    let x = (max_width as i64 - width) / 2;
    let y = (max_height as i64 - height) / 2;

    DisplayRect {
        x: left + x as i32,
        y: top + y as i32,
        w: (width as i32).max(1),
        h: (height as i32).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_picture_is_letterboxed() {
        let rect = calculate_display_rect(0, 0, 800, 600, 1920, 1080, Rational::new(1, 1));
        assert_eq!(rect, DisplayRect { x: 0, y: 75, w: 800, h: 450 });
    }

    #[test]
    fn narrow_picture_is_pillarboxed() {
        let rect = calculate_display_rect(10, 20, 1920, 1080, 640, 480, Rational::new(0, 1));
        assert_eq!(rect, DisplayRect { x: 250, y: 20, w: 1440, h: 1080 });
    }

    #[test]
    fn anamorphic_sample_aspect_ratio_is_applied() {
        // 720x576，SAR 16:15 → 显示宽高比 4:3
        let rect = calculate_display_rect(0, 0, 1024, 768, 720, 576, Rational::new(16, 15));
        assert_eq!(rect, DisplayRect { x: 0, y: 0, w: 1024, h: 768 });
    }

    #[test]
    fn degenerate_picture_fills_area() {
        let rect = calculate_display_rect(0, 0, 0, 0, 0, 0, Rational::new(1, 1));
        assert_eq!(rect.w, 1);
        assert_eq!(rect.h, 1);
    }
}

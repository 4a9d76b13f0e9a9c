//! Read model views.

pub mod order_board;
pub mod trade_board;

pub use order_board::{OrderBoardView, OrderSummary};
pub use trade_board::{TradeBoardView, TradePostSummary};

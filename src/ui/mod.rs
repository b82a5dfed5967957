mod pager;
mod select;
mod spinner;
mod status;
mod table;

pub use pager::{print_with_pager, Paging};

pub use select::select_subscription_interactive;

pub use spinner::{with_spinner, Spinner};

pub use status::{print_command_status, CommandStatus};

pub use table::subscription_table;

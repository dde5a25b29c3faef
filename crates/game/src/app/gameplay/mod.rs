mod levels;
mod objects;

pub(crate) use levels::main_game;

#[cfg(test)]
mod tests;

//! Reporter compilation.

use super::{Compiler, Kind};
use crate::compiler::ir::{BinaryOp, CompareOp, CurrentUnit, Expr, InputType, MathFn, Sensor};
use crate::project::Block;
use crate::runtime::value::Value;
use crate::Result;

impl<'p> Compiler<'p> {
    /// Compiles a reporter block into an expression.
    ///
    /// Unknown reporters compile to the empty string.
    pub fn compile_reporter(&mut self, block: &'p Block) -> Result<Expr> {
        let expr = match block.opcode.as_str() {
            // Operators
            "operator_add" => self.binary(block, BinaryOp::Add)?,
            "operator_subtract" => self.binary(block, BinaryOp::Subtract)?,
            "operator_multiply" => self.binary(block, BinaryOp::Multiply)?,
            "operator_divide" => self.binary(block, BinaryOp::Divide)?,
            "operator_mod" => self.binary(block, BinaryOp::Mod)?,
            "operator_lt" => self.compare(block, CompareOp::Less)?,
            "operator_gt" => self.compare(block, CompareOp::Greater)?,
            "operator_equals" => self.compare(block, CompareOp::Equal)?,
            "operator_and" => Expr::And(
                Box::new(self.compile_input(block, "OPERAND1", InputType::Boolean)?),
                Box::new(self.compile_input(block, "OPERAND2", InputType::Boolean)?),
            ),
            "operator_or" => Expr::Or(
                Box::new(self.compile_input(block, "OPERAND1", InputType::Boolean)?),
                Box::new(self.compile_input(block, "OPERAND2", InputType::Boolean)?),
            ),
            "operator_not" => {
                Expr::Not(Box::new(self.compile_input(block, "OPERAND", InputType::Boolean)?))
            }
            "operator_random" => Expr::Random {
                // Raw values: integer-ness depends on how the bounds are written.
                from: Box::new(self.compile_input(block, "FROM", InputType::Any)?),
                to: Box::new(self.compile_input(block, "TO", InputType::Any)?),
            },
            "operator_join" => Expr::Join(
                Box::new(self.compile_input(block, "STRING1", InputType::String)?),
                Box::new(self.compile_input(block, "STRING2", InputType::String)?),
            ),
            "operator_letter_of" => Expr::LetterOf {
                index: Box::new(self.compile_input(block, "LETTER", InputType::Number)?),
                text: Box::new(self.compile_input(block, "STRING", InputType::String)?),
            },
            "operator_length" => {
                Expr::Length(Box::new(self.compile_input(block, "STRING", InputType::String)?))
            }
            "operator_contains" => Expr::Contains {
                text: Box::new(self.compile_input(block, "STRING1", InputType::String)?),
                needle: Box::new(self.compile_input(block, "STRING2", InputType::String)?),
            },
            "operator_round" => {
                Expr::Round(Box::new(self.compile_input(block, "NUM", InputType::Number)?))
            }
            "operator_mathop" => {
                let name = self.field(block, "OPERATOR");
                let arg = self.compile_input(block, "NUM", InputType::Number)?;
                match MathFn::parse(&name) {
                    Some(op) => Expr::Math { op, arg: Box::new(arg) },
                    None => {
                        tracing::warn!(operator = %name, "unknown math function, reporting 0");
                        Expr::number(0.0)
                    }
                }
            }

            // Data
            "data_variable" => Expr::Variable(self.reference(block, Kind::Variable, "VARIABLE")),
            "data_listcontents" => Expr::ListContents(self.reference(block, Kind::List, "LIST")),
            "data_itemoflist" => Expr::ListItem {
                list: self.reference(block, Kind::List, "LIST"),
                index: Box::new(self.compile_input(block, "INDEX", InputType::Any)?),
            },
            "data_itemnumoflist" => Expr::ListIndexOf {
                list: self.reference(block, Kind::List, "LIST"),
                item: Box::new(self.compile_input(block, "ITEM", InputType::Any)?),
            },
            "data_lengthoflist" => Expr::ListLength(self.reference(block, Kind::List, "LIST")),
            "data_listcontainsitem" => Expr::ListContains {
                list: self.reference(block, Kind::List, "LIST"),
                item: Box::new(self.compile_input(block, "ITEM", InputType::Any)?),
            },

            // Procedure arguments
            "argument_reporter_string_number" | "argument_reporter_boolean" => {
                let name = self.field(block, "VALUE");
                match self.scope.argument(&name) {
                    Some(position) => Expr::Argument(position),
                    // Outside a definition the reporter reads a default.
                    None if block.opcode == "argument_reporter_boolean" => {
                        Expr::Const(Value::Boolean(false))
                    }
                    None => Expr::number(0.0),
                }
            }

            // Motion, looks, sound
            "motion_xposition" => Expr::Sense(Sensor::X),
            "motion_yposition" => Expr::Sense(Sensor::Y),
            "motion_direction" => Expr::Sense(Sensor::Direction),
            "looks_size" => Expr::Sense(Sensor::Size),
            "looks_costumenumbername" => match self.field(block, "NUMBER_NAME").as_str() {
                "name" => Expr::Sense(Sensor::CostumeName),
                _ => Expr::Sense(Sensor::CostumeNumber),
            },
            "looks_backdropnumbername" => match self.field(block, "NUMBER_NAME").as_str() {
                "name" => Expr::Sense(Sensor::BackdropName),
                _ => Expr::Sense(Sensor::BackdropNumber),
            },
            "sound_volume" => Expr::Sense(Sensor::Volume),

            // Sensing
            "sensing_timer" => Expr::Sense(Sensor::Timer),
            "sensing_answer" => Expr::Sense(Sensor::Answer),
            "sensing_username" => Expr::Sense(Sensor::Username),
            "sensing_mousex" => Expr::Sense(Sensor::MouseX),
            "sensing_mousey" => Expr::Sense(Sensor::MouseY),
            "sensing_mousedown" => Expr::Sense(Sensor::MouseDown),
            "sensing_loudness" => Expr::Sense(Sensor::Loudness),
            "sensing_dayssince2000" => Expr::Sense(Sensor::DaysSince2000),
            "sensing_current" => {
                let unit = self.field(block, "CURRENTMENU");
                match CurrentUnit::parse(&unit) {
                    Some(unit) => Expr::Sense(Sensor::Current(unit)),
                    None => {
                        tracing::warn!(unit = %unit, "unknown time unit, reporting 0");
                        Expr::number(0.0)
                    }
                }
            }
            "sensing_keypressed" => Expr::KeyPressed(Box::new(self.compile_input(
                block,
                "KEY_OPTION",
                InputType::String,
            )?)),
            "sensing_touchingobject" => Expr::Touching(Box::new(self.compile_input(
                block,
                "TOUCHINGOBJECTMENU",
                InputType::String,
            )?)),
            "sensing_of" => Expr::Of {
                property: self.field(block, "PROPERTY"),
                object: Box::new(self.compile_input(block, "OBJECT", InputType::String)?),
            },

            opcode => {
                tracing::warn!(sprite = %self.target.name, opcode, "unknown reporter, reporting empty text");
                Expr::text("")
            }
        };
        Ok(expr)
    }

    fn binary(&mut self, block: &'p Block, op: BinaryOp) -> Result<Expr> {
        let lhs = self.compile_input(block, "NUM1", InputType::Number)?;
        let rhs = self.compile_input(block, "NUM2", InputType::Number)?;
        Ok(Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    /// Comparisons see raw values; numeric-vs-text is decided at runtime.
    fn compare(&mut self, block: &'p Block, op: CompareOp) -> Result<Expr> {
        let lhs = self.compile_input(block, "OPERAND1", InputType::Any)?;
        let rhs = self.compile_input(block, "OPERAND2", InputType::Any)?;
        Ok(Expr::Compare { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }
}
